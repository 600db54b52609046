//! Tourdata Sync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls tourism listings from the public data portal and keeps local
//! tables in step with them.
//!
//! # Overview
//!
//! - **Sources**: the catalog of upstream services, their endpoints and
//!   response envelopes ([`source`], [`envelope`])
//! - **Paginator**: rate-limited paging over one endpoint ([`paginator`])
//! - **Field Mapper**: raw items to typed, fingerprinted records ([`mapper`])
//! - **Reconciler**: insert/update/skip by key and fingerprint ([`reconcile`])
//! - **Storage**: the [`store::RecordStore`] trait with PostgreSQL and
//!   in-memory backends, plus local JSON dumps ([`sink`])
//! - **Orchestrator**: one run end to end, with audit rows ([`orchestrator`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourdata_sync::{RunRequest, SourceType, SyncConfig, SyncOrchestrator};
//! use tourdata_sync::store::PgRecordStore;
//!
//! # async fn run() -> tourdata_sync::Result<()> {
//! let config = SyncConfig::load()?;
//! let store = Arc::new(PgRecordStore::connect_lazy(&config.database)?);
//! let orchestrator = SyncOrchestrator::new(config, store)?;
//!
//! let report = orchestrator.run(&RunRequest::listing(SourceType::GreenTour)).await?;
//! println!("{} new, {} updated", report.stats.new, report.stats.updated);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod mapper;
pub mod models;
pub mod orchestrator;
pub mod paginator;
pub mod reconcile;
pub mod sink;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use config::SyncConfig;
pub use error::{ErrorKind, Result, SyncError};
pub use models::{NormalizedRecord, SyncStats, SyncStatus};
pub use orchestrator::{BatchReport, RunReport, RunRequest, SyncOrchestrator};
pub use reconcile::{Reconciler, WriteMode};
pub use source::{SourceConfig, SourceType};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tourism open-data synchronizer
#[derive(Parser, Debug)]
#[command(name = "tourdata-sync")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List sources and their endpoints
    List,

    /// Fetch one endpoint
    Fetch {
        /// Source, by menu key or tag (e.g. "1" or "greentour")
        api: SourceType,

        /// Endpoint id within the source
        endpoint: String,

        /// Skip the local JSON dump
        #[arg(long)]
        no_local: bool,

        /// Write to the database
        #[arg(long)]
        db: bool,
    },

    /// Sync the listing endpoint of every source into the database
    SyncAll,

    /// Reconcile a saved JSON dump into the database
    SyncFile {
        /// Source the dump was taken from
        api: SourceType,

        /// Path to the dump
        path: PathBuf,
    },
}

impl Commands {
    /// Run request for `fetch`, if this is one
    pub fn run_request(&self) -> Option<RunRequest> {
        match self {
            Commands::Fetch {
                api,
                endpoint,
                no_local,
                db,
            } => Some(
                RunRequest::new(*api, endpoint.clone())
                    .save_local(!no_local)
                    .save_db(*db),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from(["tourdata-sync", "fetch", "greentour", "2", "--db"]).unwrap();
        let request = cli.command.run_request().unwrap();
        assert_eq!(request.source, SourceType::GreenTour);
        assert_eq!(request.endpoint_id, "2");
        assert!(request.save_local);
        assert!(request.save_db);

        let cli = Cli::try_parse_from(["tourdata-sync", "fetch", "3", "1", "--no-local"]).unwrap();
        let request = cli.command.run_request().unwrap();
        assert_eq!(request.source, SourceType::BaseTour);
        assert!(!request.save_local);
        assert!(!request.save_db);
    }

    #[test]
    fn test_parse_rejects_unknown_source() {
        assert!(Cli::try_parse_from(["tourdata-sync", "fetch", "museum", "1"]).is_err());
    }

    #[test]
    fn test_parse_sync_file() {
        let cli =
            Cli::try_parse_from(["tourdata-sync", "-v", "sync-file", "barrier_free", "dump.json"])
                .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::SyncFile { api, path } => {
                assert_eq!(api, SourceType::BarrierFree);
                assert_eq!(path, PathBuf::from("dump.json"));
            },
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Cli::try_parse_from(["tourdata-sync", "sync-all"])
            .unwrap()
            .command
            .run_request()
            .is_none());
    }
}
