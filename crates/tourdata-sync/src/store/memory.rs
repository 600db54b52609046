//! In-memory record store
//!
//! Used in tests and dry runs. Supports failure injection: the whole store
//! can be made unreachable, the audit table can be made unavailable, and
//! writes of rows carrying a given column value can be rejected.

use super::{check_identifier, RecordStore, SYNC_LOG_TABLE};
use crate::error::{Result, SyncError};
use crate::models::{ProjectedRow, Row, SyncLogEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A stored row with its generated id
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: i64,
    pub values: Row,
    /// Number of times this row was updated
    pub revisions: u32,
}

/// Calls made against the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub pings: usize,
    pub selects: usize,
    pub inserted_rows: usize,
    pub updates: usize,
    pub upserted_rows: usize,
    pub sync_logs: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<StoredRow>>,
    sync_logs: Vec<SyncLogEntry>,
    next_id: i64,
    unreachable: bool,
    sync_log_unavailable: bool,
    rejections: Vec<(String, String)>,
    calls: CallCounts,
}

impl MemoryState {
    fn check_reachable(&self, table: &str) -> Result<()> {
        if self.unreachable {
            Err(SyncError::storage(table, "connection refused"))
        } else {
            Ok(())
        }
    }

    fn check_row(&self, table: &str, row: &Row) -> Result<()> {
        for (column, value) in &self.rejections {
            let text = row.get(column).and_then(|v| v.as_text());
            if text.as_deref() == Some(value.as_str()) {
                return Err(SyncError::storage(
                    table,
                    format!("write rejected for {} = '{}'", column, value),
                ));
            }
        }
        for column in row.keys() {
            check_identifier(column)?;
        }
        Ok(())
    }

    fn push_row(&mut self, table: &str, values: Row) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.tables.entry(table.to_string()).or_default().push(StoredRow {
            id,
            values,
            revisions: 0,
        });
        id
    }
}

/// Text form of a stored column; `id` is the generated id
fn stored_text(stored: &StoredRow, column: &str) -> Option<String> {
    if column == "id" {
        Some(stored.id.to_string())
    } else {
        stored.values.get(column).and_then(|v| v.as_text())
    }
}

/// Record store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::storage("memory", "store lock poisoned"))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Option<T> {
        self.state().ok().map(|mut state| f(&mut state))
    }

    /// Make every call fail as if the database were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.with_state(|s| s.unreachable = unreachable);
    }

    /// Make audit writes fail while other tables keep working
    pub fn set_sync_log_unavailable(&self, unavailable: bool) {
        self.with_state(|s| s.sync_log_unavailable = unavailable);
    }

    /// Reject inserts and updates of rows whose `column` renders as `value`
    pub fn reject_writes_where(&self, column: &str, value: &str) {
        self.with_state(|s| s.rejections.push((column.to_string(), value.to_string())));
    }

    /// Store a row directly, bypassing call counting; returns its id
    pub fn seed(&self, table: &str, values: Row) -> i64 {
        self.with_state(|s| s.push_row(table, values)).unwrap_or_default()
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.with_state(|s| s.tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn sync_logs(&self) -> Vec<SyncLogEntry> {
        self.with_state(|s| s.sync_logs.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.with_state(|s| s.calls).unwrap_or_default()
    }

    pub fn reset_calls(&self) {
        self.with_state(|s| s.calls = CallCounts::default());
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn ping(&self) -> Result<()> {
        let mut state = self.state()?;
        state.calls.pings += 1;
        state.check_reachable(SYNC_LOG_TABLE)
    }

    async fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<ProjectedRow>> {
        let mut state = self.state()?;
        state.calls.selects += 1;
        state.check_reachable(table)?;

        let rows = state.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .map(|stored| {
                columns
                    .iter()
                    .map(|column| (column.to_string(), stored_text(stored, column)))
                    .collect()
            })
            .collect())
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let mut state = self.state()?;
        state.check_reachable(table)?;
        check_identifier(table)?;
        for row in rows {
            state.check_row(table, row)?;
        }

        for row in rows {
            state.push_row(table, row.clone());
        }
        state.calls.inserted_rows += rows.len();
        Ok(rows.len() as u64)
    }

    async fn update(&self, table: &str, id: i64, row: &Row) -> Result<()> {
        let mut state = self.state()?;
        state.check_reachable(table)?;
        state.check_row(table, row)?;

        let stored = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|stored| stored.id == id))
            .ok_or_else(|| SyncError::storage(table, format!("no row with id {}", id)))?;
        for (column, value) in row {
            stored.values.insert(column.clone(), value.clone());
        }
        stored.revisions += 1;
        state.calls.updates += 1;
        Ok(())
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
        _batch_size: usize,
    ) -> Result<u64> {
        let mut state = self.state()?;
        state.check_reachable(table)?;
        for row in rows {
            state.check_row(table, row)?;
        }

        let incoming_key = |row: &Row| -> Vec<Option<String>> {
            conflict_columns
                .iter()
                .map(|column| row.get(*column).and_then(|v| v.as_text()))
                .collect()
        };
        let stored_key = |stored: &StoredRow| -> Vec<Option<String>> {
            conflict_columns
                .iter()
                .map(|column| stored_text(stored, column))
                .collect()
        };

        for row in rows {
            let key = incoming_key(row);
            let mut values = row.clone();
            values.remove("id");

            let existing = state
                .tables
                .get_mut(table)
                .and_then(|stored| stored.iter_mut().find(|s| stored_key(s) == key));
            match existing {
                Some(stored) => {
                    stored.values.extend(values);
                    stored.revisions += 1;
                },
                None => {
                    state.push_row(table, values);
                },
            }
        }
        state.calls.upserted_rows += rows.len();
        Ok(rows.len() as u64)
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        let mut state = self.state()?;
        state.check_reachable(SYNC_LOG_TABLE)?;
        if state.sync_log_unavailable {
            return Err(SyncError::storage(SYNC_LOG_TABLE, "relation is unavailable"));
        }
        state.sync_logs.push(entry.clone());
        state.calls.sync_logs += 1;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<i64> {
        let state = self.state()?;
        state.check_reachable(table)?;
        Ok(state.tables.get(table).map(|rows| rows.len() as i64).unwrap_or(0))
    }
}
