//! Sync run orchestration
//!
//! Drives one (source, endpoint) pair end to end:
//!
//! 1. resolve the endpoint (unknown ids fail before any I/O)
//! 2. check that storage is reachable when database output is requested
//! 3. page through the endpoint
//! 4. dump the assembled document to a local file, if requested
//! 5. reconcile listing items into the source's table, or archive the raw
//!    items of any other endpoint
//! 6. append an audit row for reconciliation runs
//!
//! Failures after step 2 never escape as errors: they are logged, recorded
//! in the audit table and reported through [`RunReport::success`].

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::mapper;
use crate::models::{ColumnValue, Row, SyncStats};
use crate::paginator::Paginator;
use crate::reconcile::Reconciler;
use crate::sink::JsonFileSink;
use crate::source::{Endpoint, SourceConfig, SourceType};
use crate::store::{RecordStore, RAW_ARCHIVE_TABLE};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What to run and where to put the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub source: SourceType,
    pub endpoint_id: String,
    /// Dump the fetched document to the data directory
    pub save_local: bool,
    /// Write to the database (reconcile or archive)
    pub save_db: bool,
}

impl RunRequest {
    /// Fetch-only request with a local dump
    pub fn new(source: SourceType, endpoint_id: impl Into<String>) -> Self {
        Self {
            source,
            endpoint_id: endpoint_id.into(),
            save_local: true,
            save_db: false,
        }
    }

    /// Database sync of the source's listing endpoint
    pub fn listing(source: SourceType) -> Self {
        Self {
            source,
            endpoint_id: source.listing_endpoint().id.to_string(),
            save_local: false,
            save_db: true,
        }
    }

    pub fn save_local(mut self, save_local: bool) -> Self {
        self.save_local = save_local;
        self
    }

    pub fn save_db(mut self, save_db: bool) -> Self {
        self.save_db = save_db;
        self
    }
}

/// Result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub api_type: &'static str,
    pub endpoint: &'static str,
    /// Table written to, when database output was requested
    pub table: Option<&'static str>,
    /// Items returned by the upstream (or read from file)
    pub items_fetched: usize,
    pub stats: SyncStats,
    /// Local dump written by this run
    pub file: Option<PathBuf>,
}

impl RunReport {
    fn new(run_id: Uuid, source: SourceType, endpoint: &Endpoint) -> Self {
        Self {
            run_id,
            api_type: source.api_type(),
            endpoint: endpoint.name(),
            table: None,
            items_fetched: 0,
            stats: SyncStats::default(),
            file: None,
        }
    }

    pub fn success(&self) -> bool {
        self.stats.success
    }
}

/// Results of a full sync over every source
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<RunReport>,
}

impl BatchReport {
    /// True only when every run succeeded
    pub fn success(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(RunReport::success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunReport> {
        self.reports.iter().filter(|report| !report.success())
    }
}

/// Runs sync requests against the portal and a record store
pub struct SyncOrchestrator {
    config: SyncConfig,
    paginator: Paginator,
    store: Arc<dyn RecordStore>,
    sink: JsonFileSink,
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        let paginator = Paginator::from_config(&config.api)?;
        let sink = JsonFileSink::new(config.output.data_dir.clone());
        Ok(Self {
            config,
            paginator,
            store,
            sink,
        })
    }

    /// Run one request.
    ///
    /// Returns `Err` only for an unknown endpoint, a missing service key or
    /// unreachable storage; every other failure is reported in the returned
    /// [`RunReport`].
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let source = SourceConfig::resolve(request.source, &self.config);
        let endpoint = source.endpoint(&request.endpoint_id)?;
        self.config.api.require_service_key()?;

        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sync_run",
            %run_id,
            api_type = source.api_type(),
            endpoint = endpoint.name()
        );

        async move {
            if request.save_db {
                self.check_storage().await?;
            }

            info!(description = endpoint.description, "Starting run");
            let started = Instant::now();
            let mut report = RunReport::new(run_id, request.source, endpoint);
            if request.save_db {
                report.table = Some(if endpoint.is_listing() {
                    request.source.table_name()
                } else {
                    RAW_ARCHIVE_TABLE
                });
            }

            let result = self.execute(&source, endpoint, request, &mut report).await;
            report.stats = finish(result, started);

            if request.save_db && endpoint.is_listing() {
                self.record_audit(request.source, &report.stats).await;
            }
            log_summary(&report);
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Sync the listing endpoint of every source, one after another.
    ///
    /// A failing source does not stop the others.
    pub async fn sync_all(&self) -> Result<BatchReport> {
        self.check_storage().await?;

        let mut batch = BatchReport::default();
        for source in SourceType::ALL {
            let request = RunRequest::listing(source);
            match self.run(&request).await {
                Ok(report) => batch.reports.push(report),
                Err(e) => {
                    error!(api_type = source.api_type(), error = %e, "Run aborted");
                    let mut report =
                        RunReport::new(Uuid::new_v4(), source, source.listing_endpoint());
                    report.stats = SyncStats::failed(e.to_string(), Default::default());
                    batch.reports.push(report);
                },
            }
        }

        info!(
            runs = batch.reports.len(),
            failed = batch.failed().count(),
            "Full sync finished"
        );
        Ok(batch)
    }

    /// Reconcile a previously saved document into the source's table.
    ///
    /// Needs no service key. A document without items fails the run and
    /// is not audited.
    pub async fn sync_file(&self, source: SourceType, path: &Path) -> Result<RunReport> {
        let endpoint = source.listing_endpoint();
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "sync_run",
            %run_id,
            api_type = source.api_type(),
            file = %path.display()
        );

        async move {
            self.check_storage().await?;

            let started = Instant::now();
            let mut report = RunReport::new(run_id, source, endpoint);
            report.table = Some(source.table_name());
            report.file = Some(path.to_path_buf());

            let result = match JsonFileSink::read(path).await {
                Ok(document) => {
                    let items = source.envelope().extract(&document);
                    if items.is_empty() {
                        let e = SyncError::NoData(format!("no items in {}", path.display()));
                        report.stats = SyncStats::failed(e.to_string(), started.elapsed());
                        log_summary(&report);
                        return Ok(report);
                    }
                    report.items_fetched = items.len();
                    self.reconcile_items(source, &items).await
                },
                Err(e) => Err(e),
            };
            report.stats = finish(result, started);

            self.record_audit(source, &report.stats).await;
            log_summary(&report);
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn check_storage(&self) -> Result<()> {
        self.store.ping().await.map_err(|e| {
            error!(error = %e, "Storage is unreachable");
            e
        })
    }

    async fn execute(
        &self,
        source: &SourceConfig,
        endpoint: &'static Endpoint,
        request: &RunRequest,
        report: &mut RunReport,
    ) -> Result<SyncStats> {
        // 1. Fetch every page
        let items = self.fetch(source, endpoint).await?;
        report.items_fetched = items.len();
        let document = source.wrap_document(items);

        // 2. Local dump
        if request.save_local {
            match self.sink.write(request.source, endpoint, &document).await {
                Ok(path) => report.file = Some(path),
                Err(e) if request.save_db => {
                    warn!(error = %e, "Local save failed, continuing with database output");
                },
                Err(e) => return Err(e),
            }
        }

        if !request.save_db {
            return Ok(SyncStats {
                total: report.items_fetched,
                success: true,
                ..Default::default()
            });
        }

        // 3. Database output
        let items = source.extract_items(&document);
        if endpoint.is_listing() {
            self.reconcile_items(request.source, &items).await
        } else {
            self.archive(request.source, endpoint, &items).await
        }
    }

    async fn fetch(&self, source: &SourceConfig, endpoint: &Endpoint) -> Result<Vec<Value>> {
        let params = source.query_params(endpoint);

        let Some(split) = source.source.region_split() else {
            let outcome = self
                .paginator
                .fetch_all(&source.base_url, endpoint.path, &params)
                .await;
            if let Some(e) = outcome.error {
                warn!(
                    partial_items = outcome.items.len(),
                    "Discarding partial fetch"
                );
                return Err(e);
            }
            return Ok(outcome.items);
        };

        let outcome = self
            .paginator
            .fetch_by_region(&source.base_url, endpoint.path, &params, &split)
            .await;
        if outcome.all_failed() {
            error!(regions = outcome.regions, "Every region failed");
            if let Some(first) = outcome.failures.into_iter().next() {
                return Err(first.error);
            }
        }
        Ok(outcome.items)
    }

    async fn reconcile_items(&self, source: SourceType, items: &[Value]) -> Result<SyncStats> {
        let mapped = mapper::map_items(source, items);
        if mapped.failed > 0 {
            warn!(failed = mapped.failed, "Some items could not be mapped");
        }
        info!(mapped = mapped.records.len(), "Items mapped");

        let outcome = Reconciler::new(self.store.as_ref())
            .with_mode(self.config.database.write_mode)
            .reconcile(source.table_name(), source, &mapped.records)
            .await?;

        Ok(SyncStats {
            total: items.len(),
            new: outcome.new,
            updated: outcome.updated,
            unchanged: outcome.unchanged,
            failed: mapped.failed + outcome.failed,
            success: true,
            ..Default::default()
        })
    }

    /// Append raw items of a non-listing endpoint to the archive table
    async fn archive(
        &self,
        source: SourceType,
        endpoint: &Endpoint,
        items: &[Value],
    ) -> Result<SyncStats> {
        if items.is_empty() {
            return Err(SyncError::NoData(format!(
                "{} returned no items",
                endpoint.name()
            )));
        }

        let tag = JsonFileSink::dataset_tag(source, endpoint);
        let rows: Vec<Row> = items
            .iter()
            .map(|item| {
                let mut row = Row::new();
                row.insert("api_type".to_string(), ColumnValue::text(&tag));
                row.insert("endpoint_name".to_string(), ColumnValue::text(endpoint.name()));
                row.insert("data".to_string(), ColumnValue::text(item.to_string()));
                row
            })
            .collect();

        let written = self.store.insert(RAW_ARCHIVE_TABLE, &rows).await?;
        info!(table = RAW_ARCHIVE_TABLE, written, "Archived raw items");

        Ok(SyncStats {
            total: items.len(),
            new: usize::try_from(written).unwrap_or(usize::MAX),
            success: true,
            ..Default::default()
        })
    }

    /// Append the audit row; a failure here is logged and dropped
    async fn record_audit(&self, source: SourceType, stats: &SyncStats) {
        let entry = stats.to_log_entry(source.api_type(), source.table_name());
        if let Err(e) = self.store.append_sync_log(&entry).await {
            warn!(error = %e, "Failed to record sync log");
        }
    }
}

fn finish(result: Result<SyncStats>, started: Instant) -> SyncStats {
    let mut stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), "Run failed");
            SyncStats::failed(e.to_string(), started.elapsed())
        },
    };
    stats.duration = started.elapsed();
    stats
}

fn log_summary(report: &RunReport) {
    let stats = &report.stats;
    if stats.success {
        info!(
            items = report.items_fetched,
            new = stats.new,
            updated = stats.updated,
            unchanged = stats.unchanged,
            failed = stats.failed,
            elapsed_ms = stats.duration.as_millis() as u64,
            "Run finished"
        );
    } else {
        warn!(
            error = stats.error_message.as_deref().unwrap_or_default(),
            elapsed_ms = stats.duration.as_millis() as u64,
            "Run failed"
        );
    }
}
