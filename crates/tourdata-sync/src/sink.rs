//! Local JSON dumps of fetched documents

use crate::error::Result;
use crate::source::{Endpoint, SourceType};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes run documents as pretty-printed JSON files
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Dataset tag shared by dump files and raw archive rows,
    /// e.g. "1greentour_1areaCode1"
    pub fn dataset_tag(source: SourceType, endpoint: &Endpoint) -> String {
        format!(
            "{}{}_{}{}",
            source.menu_key(),
            source.api_type(),
            endpoint.id,
            endpoint.name()
        )
    }

    /// File name for a dump taken at `timestamp`
    pub fn file_name(source: SourceType, endpoint: &Endpoint, timestamp: DateTime<Local>) -> String {
        format!(
            "{}_{}.json",
            Self::dataset_tag(source, endpoint),
            timestamp.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write `document`, creating the directory if needed
    pub async fn write(
        &self,
        source: SourceType,
        endpoint: &Endpoint,
        document: &Value,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(source, endpoint, Local::now()));
        let bytes = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&path, &bytes).await?;

        info!(path = %path.display(), bytes = bytes.len(), "Saved document");
        Ok(path)
    }

    /// Read back a document written by [`JsonFileSink::write`]
    pub async fn read(path: &Path) -> Result<Value> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
