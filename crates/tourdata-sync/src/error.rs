//! Error types for tourism data synchronization
//!
//! Every failure carries a human-readable message. [`SyncError::kind`] maps
//! each variant onto the coarse taxonomy used to decide whether a failure
//! aborts a run or is recovered locally.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Non-200 status, network failure or upstream rejection while paging
    Transport,
    /// Malformed JSON, a missing response envelope or a document without items
    Parse,
    /// A single item could not be normalized
    Mapping,
    /// A storage collaborator (database or file sink) failed
    Storage,
    /// Unknown source or endpoint, invalid settings
    Config,
}

/// Errors raised while fetching, mapping or storing tourism records
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP {status} error (page {page})")]
    HttpStatus { status: u16, page: u32 },

    #[error("Request for page {page} failed: {source}")]
    Transport {
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream rejected page {page} with result code {code}: {message}")]
    UpstreamRejected {
        page: u32,
        code: String,
        message: String,
    },

    #[error("Failed to parse page {page}: {message}")]
    Parse { page: u32, message: String },

    #[error("No data found: {0}")]
    NoData(String),

    #[error("Failed to map {api_type} item: {reason}")]
    Mapping {
        api_type: &'static str,
        reason: String,
    },

    #[error("Storage error on '{table}': {message}")]
    Storage { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a storage error for `table`
    pub fn storage(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a mapping error for one item of `api_type`
    pub fn mapping(api_type: &'static str, reason: impl Into<String>) -> Self {
        Self::Mapping {
            api_type,
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::HttpStatus { .. }
            | SyncError::Transport { .. }
            | SyncError::UpstreamRejected { .. } => ErrorKind::Transport,
            SyncError::Parse { .. } | SyncError::NoData(_) | SyncError::Serialization(_) => {
                ErrorKind::Parse
            },
            SyncError::Mapping { .. } => ErrorKind::Mapping,
            SyncError::Storage { .. } | SyncError::Io(_) => ErrorKind::Storage,
            SyncError::Config(_) => ErrorKind::Config,
        }
    }

    /// Page number the error refers to, for paging failures
    pub fn page(&self) -> Option<u32> {
        match self {
            SyncError::HttpStatus { page, .. }
            | SyncError::Transport { page, .. }
            | SyncError::UpstreamRejected { page, .. }
            | SyncError::Parse { page, .. } => Some(*page),
            _ => None,
        }
    }
}
