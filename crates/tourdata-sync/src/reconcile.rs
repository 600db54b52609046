//! Hash-based reconciliation of incoming records against stored rows
//!
//! Stored rows are loaded once per run, projected to id, key columns and
//! `data_hash`. Each incoming record is then matched by key:
//!
//! - key unknown: insert
//! - key known, fingerprint differs: update the stored row by id
//! - key known, fingerprint equal: skip
//!
//! Running twice over unchanged upstream data therefore writes nothing the
//! second time.

use crate::error::Result;
use crate::models::{ColumnValue, NormalizedRecord, Row};
use crate::source::SourceType;
use crate::store::{ExistingRow, RecordStore, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Progress is logged every this many records
const PROGRESS_INTERVAL: usize = 100;

/// How reconciliation decisions are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// One statement per record; a failing record is skipped
    #[default]
    PerRecord,
    /// Inserts and updates collected and written in batches; a failing
    /// batch fails the run
    Batched { batch_size: usize },
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_record" | "record" => Ok(WriteMode::PerRecord),
            "batched" | "batch" => Ok(WriteMode::Batched {
                batch_size: DEFAULT_BATCH_SIZE,
            }),
            other => Err(format!("Invalid write mode: {}", other)),
        }
    }
}

/// Counts produced by one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records whose write failed
    pub failed: usize,
}

enum Decision<'a> {
    Insert,
    Update(&'a ExistingRow),
    Skip,
}

/// Applies insert/update/skip decisions through a [`RecordStore`]
pub struct Reconciler<'a> {
    store: &'a dyn RecordStore,
    mode: WriteMode,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            mode: WriteMode::PerRecord,
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Load stored rows of `table`, indexed by key value.
    ///
    /// A later row with the same key replaces an earlier one.
    pub async fn load_existing(
        &self,
        table: &str,
        source: SourceType,
    ) -> Result<HashMap<String, ExistingRow>> {
        let key = source.primary_key();
        let projection = ExistingRow::projection(&key);
        let rows = self.store.select(table, &projection).await?;

        let mut existing = HashMap::with_capacity(rows.len());
        for row in &rows {
            let stored = ExistingRow::from_projection(table, &key, row)?;
            existing.insert(stored.key.clone(), stored);
        }
        Ok(existing)
    }

    /// Reconcile `records` into `table`.
    ///
    /// Fails only if the stored rows cannot be loaded or, in batched mode,
    /// a batch write fails.
    pub async fn reconcile(
        &self,
        table: &str,
        source: SourceType,
        records: &[NormalizedRecord],
    ) -> Result<ReconcileOutcome> {
        let existing = self.load_existing(table, source).await?;
        info!(table, existing = existing.len(), incoming = records.len(), "Reconciling");

        let mut outcome = ReconcileOutcome {
            total: records.len(),
            ..Default::default()
        };

        match self.mode {
            WriteMode::PerRecord => {
                self.apply_per_record(table, records, &existing, &mut outcome)
                    .await
            },
            WriteMode::Batched { batch_size } => {
                self.apply_batched(table, records, &existing, batch_size, &mut outcome)
                    .await?
            },
        }

        info!(
            table,
            new = outcome.new,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            failed = outcome.failed,
            "Reconciliation finished"
        );
        Ok(outcome)
    }

    async fn apply_per_record(
        &self,
        table: &str,
        records: &[NormalizedRecord],
        existing: &HashMap<String, ExistingRow>,
        outcome: &mut ReconcileOutcome,
    ) {
        for (index, record) in records.iter().enumerate() {
            let key = record.key_value();
            let result = match decide(record, &key, existing) {
                Decision::Insert => self
                    .store
                    .insert(table, &[record.to_row()])
                    .await
                    .map(|_| outcome.new += 1),
                Decision::Update(stored) => self
                    .store
                    .update(table, stored.id, &record.to_row())
                    .await
                    .map(|_| outcome.updated += 1),
                Decision::Skip => {
                    outcome.unchanged += 1;
                    Ok(())
                },
            };

            if let Err(e) = result {
                warn!(table, key = %key, error = %e, "Record write failed");
                outcome.failed += 1;
            }

            if (index + 1) % PROGRESS_INTERVAL == 0 {
                debug!(
                    processed = index + 1,
                    total = records.len(),
                    new = outcome.new,
                    updated = outcome.updated,
                    "Reconcile progress"
                );
            }
        }
    }

    async fn apply_batched(
        &self,
        table: &str,
        records: &[NormalizedRecord],
        existing: &HashMap<String, ExistingRow>,
        batch_size: usize,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        let mut inserts: Vec<Row> = Vec::new();
        let mut updates: Vec<Row> = Vec::new();

        for record in records {
            let key = record.key_value();
            match decide(record, &key, existing) {
                Decision::Insert => inserts.push(record.to_row()),
                Decision::Update(stored) => {
                    let mut row = record.to_row();
                    row.insert("id".to_string(), ColumnValue::Int(Some(stored.id)));
                    updates.push(row);
                },
                Decision::Skip => outcome.unchanged += 1,
            }
        }

        let batch_size = batch_size.max(1);
        for batch in inserts.chunks(batch_size) {
            self.store.insert(table, batch).await?;
            outcome.new += batch.len();
            debug!(table, rows = batch.len(), "Inserted batch");
        }
        for batch in updates.chunks(batch_size) {
            self.store.upsert(table, batch, &["id"], batch_size).await?;
            outcome.updated += batch.len();
            debug!(table, rows = batch.len(), "Updated batch");
        }
        Ok(())
    }
}

fn decide<'e>(
    record: &NormalizedRecord,
    key: &str,
    existing: &'e HashMap<String, ExistingRow>,
) -> Decision<'e> {
    match existing.get(key) {
        None => Decision::Insert,
        Some(stored) if stored.data_hash.as_deref() == Some(record.data_hash()) => Decision::Skip,
        Some(stored) => Decision::Update(stored),
    }
}
