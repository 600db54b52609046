//! Record storage
//!
//! The pipeline talks to storage only through [`RecordStore`]. Tables and
//! columns are addressed by name so one store serves every source.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

use crate::error::{Result, SyncError};
use crate::models::{ProjectedRow, Row, SyncLogEntry};
use crate::source::PrimaryKey;
use async_trait::async_trait;

/// Raw archive table for non-listing endpoints
pub const RAW_ARCHIVE_TABLE: &str = "tourism_data";

/// Audit table written once per reconciliation run
pub const SYNC_LOG_TABLE: &str = "sync_logs";

/// Rows per statement for bulk writes
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Storage backend for tourism records (dependency injection)
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Check that storage is reachable
    async fn ping(&self) -> Result<()>;

    /// Read `columns` of every row in `table`, each rendered as text
    async fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<ProjectedRow>>;

    /// Insert rows, returning how many were written
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Overwrite the given columns of the row with `id`
    async fn update(&self, table: &str, id: i64, row: &Row) -> Result<()>;

    /// Insert or overwrite rows matching on `conflict_columns`
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
        batch_size: usize,
    ) -> Result<u64>;

    /// Append one audit row to `sync_logs`
    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()>;

    /// Number of rows in `table`
    async fn count(&self, table: &str) -> Result<i64>;
}

/// Identity and fingerprint of a stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRow {
    pub id: i64,
    pub key: String,
    pub data_hash: Option<String>,
}

impl ExistingRow {
    /// Columns to project when loading existing rows for `key`
    pub fn projection(key: &PrimaryKey) -> Vec<&'static str> {
        let mut columns = vec!["id"];
        columns.extend_from_slice(key.columns());
        columns.push("data_hash");
        columns
    }

    pub fn from_projection(table: &str, key: &PrimaryKey, row: &ProjectedRow) -> Result<Self> {
        let id = row
            .get("id")
            .and_then(|id| id.as_deref())
            .ok_or_else(|| SyncError::storage(table, "row without id"))?;
        let id = id
            .parse::<i64>()
            .map_err(|_| SyncError::storage(table, format!("non-numeric id '{}'", id)))?;

        Ok(Self {
            id,
            key: key.key_value(|column| row.get(column).cloned().flatten()),
            data_hash: row.get("data_hash").cloned().flatten(),
        })
    }
}

/// Reject anything but lowercase SQL identifiers
pub(crate) fn check_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(SyncError::storage(name, "invalid identifier"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_projection() {
        assert_eq!(
            ExistingRow::projection(&PrimaryKey::Composite(&["hubtatscode", "baseym"])),
            vec!["id", "hubtatscode", "baseym", "data_hash"]
        );
    }

    #[test]
    fn test_from_projection() {
        let key = PrimaryKey::Composite(&["hubtatscode", "baseym"]);
        let mut row = ProjectedRow::new();
        row.insert("id".into(), Some("7".into()));
        row.insert("hubtatscode".into(), Some("A".into()));
        row.insert("baseym".into(), Some("202503".into()));
        row.insert("data_hash".into(), None);

        let existing = ExistingRow::from_projection("base_tour_areabased", &key, &row).unwrap();
        assert_eq!(existing.id, 7);
        assert_eq!(existing.key, "A_202503");
        assert_eq!(existing.data_hash, None);

        row.insert("id".into(), None);
        assert!(ExistingRow::from_projection("base_tour_areabased", &key, &row).is_err());
    }

    #[test]
    fn test_check_identifier() {
        assert!(check_identifier("greentour_areabased").is_ok());
        assert!(check_identifier("ldongregn_cd").is_ok());
        assert!(check_identifier("lclsSystm1").is_err());
        assert!(check_identifier("x; DROP TABLE sync_logs").is_err());
        assert!(check_identifier("1col").is_err());
        assert!(check_identifier("").is_err());
    }
}
