//! Records, column values and run statistics

use crate::source::SourceType;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A typed value destined for one table column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Text(Option<String>),
    Float(Option<f64>),
    Int(Option<i64>),
    Json(Value),
}

impl ColumnValue {
    pub fn text(value: impl Into<String>) -> Self {
        ColumnValue::Text(Some(value.into()))
    }

    /// Text form of the value, as the database renders it with `::text`
    pub fn as_text(&self) -> Option<String> {
        match self {
            ColumnValue::Text(v) => v.clone(),
            ColumnValue::Float(v) => v.map(|f| f.to_string()),
            ColumnValue::Int(v) => v.map(|i| i.to_string()),
            ColumnValue::Json(Value::Null) => None,
            ColumnValue::Json(v) => Some(v.to_string()),
        }
    }
}

/// Column name to value, ordered by column name
pub type Row = BTreeMap<String, ColumnValue>;

/// A row read back with every column projected as text
pub type ProjectedRow = BTreeMap<String, Option<String>>;

/// One upstream item normalized into a table row
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    source: SourceType,
    columns: Vec<(&'static str, ColumnValue)>,
    data_hash: String,
    raw_data: Value,
}

impl NormalizedRecord {
    pub fn new(
        source: SourceType,
        columns: Vec<(&'static str, ColumnValue)>,
        data_hash: String,
        raw_data: Value,
    ) -> Self {
        Self {
            source,
            columns,
            data_hash,
            raw_data,
        }
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> &[(&'static str, ColumnValue)] {
        &self.columns
    }

    pub fn data_hash(&self) -> &str {
        &self.data_hash
    }

    pub fn raw_data(&self) -> &Value {
        &self.raw_data
    }

    /// Natural key used to match this record against stored rows
    pub fn key_value(&self) -> String {
        self.source
            .primary_key()
            .key_value(|column| self.get(column).and_then(ColumnValue::as_text))
    }

    /// Full row for insert or update, including `data_hash` and `raw_data`
    pub fn to_row(&self) -> Row {
        let mut row: Row = self
            .columns
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        row.insert("data_hash".to_string(), ColumnValue::text(&self.data_hash));
        row.insert("raw_data".to_string(), ColumnValue::Json(self.raw_data.clone()));
        row
    }
}

/// Outcome of one run as recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(SyncStatus::Success),
            "FAILED" => Ok(SyncStatus::Failed),
            other => Err(format!("Invalid sync status: {}", other)),
        }
    }
}

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    /// Items extracted from the fetched document. Items the mapper
    /// rejected are included here and also counted in `failed`, so
    /// `total` can exceed the number of mapped records.
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    /// Stored rows whose fingerprint already matched
    pub unchanged: usize,
    /// Items dropped by the mapper or rejected by storage
    pub failed: usize,
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncStats {
    /// Zeroed statistics for a run that failed before reconciliation finished
    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            duration,
            ..Default::default()
        }
    }

    pub fn status(&self) -> SyncStatus {
        if self.success {
            SyncStatus::Success
        } else {
            SyncStatus::Failed
        }
    }

    /// Audit row describing this run
    pub fn to_log_entry(&self, api_type: &str, table_name: &str) -> SyncLogEntry {
        SyncLogEntry {
            api_type: api_type.to_string(),
            table_name: table_name.to_string(),
            sync_date: Local::now().date_naive(),
            total_items: self.total as i64,
            new_items: self.new as i64,
            updated_items: self.updated as i64,
            status: self.status(),
            error_message: self.error_message.clone(),
            completed_at: Utc::now(),
            execution_time_seconds: self.duration.as_secs() as i64,
        }
    }
}

/// One row of the `sync_logs` audit table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub api_type: String,
    pub table_name: String,
    pub sync_date: NaiveDate,
    pub total_items: i64,
    pub new_items: i64,
    pub updated_items: i64,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub execution_time_seconds: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greentour_record() -> NormalizedRecord {
        NormalizedRecord::new(
            SourceType::GreenTour,
            vec![
                ("contentid", ColumnValue::text("126508")),
                ("title", ColumnValue::text("경주 남산")),
                ("mapx", ColumnValue::Float(None)),
            ],
            "abc".to_string(),
            json!({"contentid": "126508"}),
        )
    }

    #[test]
    fn test_as_text() {
        assert_eq!(ColumnValue::Float(Some(129.2)).as_text(), Some("129.2".to_string()));
        assert_eq!(ColumnValue::Int(Some(3)).as_text(), Some("3".to_string()));
        assert_eq!(ColumnValue::Text(None).as_text(), None);
        assert_eq!(
            ColumnValue::Json(json!({"a": 1})).as_text(),
            Some("{\"a\":1}".to_string())
        );
        assert_eq!(ColumnValue::Json(Value::Null).as_text(), None);
    }

    #[test]
    fn test_record_row_carries_hash_and_raw_data() {
        let record = greentour_record();
        let row = record.to_row();

        assert_eq!(row.get("data_hash"), Some(&ColumnValue::text("abc")));
        assert_eq!(
            row.get("raw_data"),
            Some(&ColumnValue::Json(json!({"contentid": "126508"})))
        );
        assert_eq!(row.get("mapx"), Some(&ColumnValue::Float(None)));
        assert_eq!(record.key_value(), "126508");
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!("FAILED".parse::<SyncStatus>().unwrap(), SyncStatus::Failed);
        assert_eq!(SyncStatus::Success.to_string(), "SUCCESS");
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_failed_stats_are_zeroed() {
        let stats = SyncStats::failed("HTTP 500 error (page 2)", Duration::from_secs(3));
        let entry = stats.to_log_entry("greentour", "greentour_areabased");

        assert_eq!(entry.status, SyncStatus::Failed);
        assert_eq!(entry.total_items, 0);
        assert_eq!(entry.new_items, 0);
        assert_eq!(entry.updated_items, 0);
        assert_eq!(entry.execution_time_seconds, 3);
        assert_eq!(entry.error_message.as_deref(), Some("HTTP 500 error (page 2)"));
    }
}
