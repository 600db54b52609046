//! Configuration management
//!
//! Settings are read once from the environment (and an optional `.env`
//! file) into an immutable [`SyncConfig`] that is passed to every component.

use crate::error::{Result, SyncError};
use crate::reconcile::WriteMode;
use crate::source::SourceType;
use crate::store::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// API Defaults
// ============================================================================

/// Rows requested per page.
pub const DEFAULT_ROWS_PER_PAGE: u32 = 100;

/// Hard cap on pages fetched per listing.
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Pause between consecutive page requests in milliseconds.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 100;

/// Per-request HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// `MobileOS` query parameter sent with every request.
pub const DEFAULT_MOBILE_OS: &str = "ETC";

/// Reference month for the base tour hub listing.
pub const DEFAULT_BASE_TOUR_BASE_YM: &str = "202503";

/// Province code for the base tour hub listing (Gyeongbuk).
pub const DEFAULT_BASE_TOUR_AREA_CD: &str = "47";

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/tourdata";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Directory for local JSON dumps.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub api: ApiConfig,
    pub sources: SourceUrls,
    pub base_tour: BaseTourConfig,
    pub database: DatabaseConfig,
    pub output: OutputConfig,
}

/// Upstream portal settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Decoded portal service key
    pub service_key: String,
    pub mobile_os: String,
    pub rows_per_page: u32,
    pub max_pages: u32,
    pub page_delay_ms: u64,
    pub timeout_secs: u64,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("service_key", &"<redacted>")
            .field("mobile_os", &self.mobile_os)
            .field("rows_per_page", &self.rows_per_page)
            .field("max_pages", &self.max_pages)
            .field("page_delay_ms", &self.page_delay_ms)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ApiConfig {
    /// Service key for portal requests
    pub fn require_service_key(&self) -> Result<&str> {
        let key = self.service_key.trim();
        if key.is_empty() {
            return Err(SyncError::config("DATA_KEY_DECODING is not set"));
        }
        Ok(key)
    }
}

/// Base URL of each source's service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceUrls {
    pub greentour: String,
    pub barrier_free: String,
    pub base_tour: String,
}

impl SourceUrls {
    pub fn for_source(&self, source: SourceType) -> &str {
        match source {
            SourceType::GreenTour => &self.greentour,
            SourceType::BarrierFree => &self.barrier_free,
            SourceType::BaseTour => &self.base_tour,
        }
    }
}

/// Fixed filters of the base tour hub listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseTourConfig {
    pub base_ym: String,
    pub area_cd: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub write_mode: WriteMode,
}

/// Local output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub data_dir: PathBuf,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn write_mode_from_env() -> Result<WriteMode> {
    let mode: WriteMode = match std::env::var("TOURDATA_WRITE_MODE") {
        Ok(value) => value.parse().map_err(SyncError::Config)?,
        Err(_) => WriteMode::default(),
    };
    Ok(match mode {
        WriteMode::Batched { .. } => WriteMode::Batched {
            batch_size: env_or("TOURDATA_BATCH_SIZE", DEFAULT_BATCH_SIZE),
        },
        other => other,
    })
}

impl SyncConfig {
    /// Load configuration from environment and defaults
    ///
    /// Every setting has a default. `DATA_KEY_DECODING` may be left unset;
    /// runs that fetch from the portal check it through
    /// [`ApiConfig::require_service_key`].
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = SyncConfig {
            api: ApiConfig {
                service_key: env_string("DATA_KEY_DECODING", ""),
                mobile_os: env_string("TOURDATA_MOBILE_OS", DEFAULT_MOBILE_OS),
                rows_per_page: env_or("TOURDATA_ROWS_PER_PAGE", DEFAULT_ROWS_PER_PAGE),
                max_pages: env_or("TOURDATA_MAX_PAGES", DEFAULT_MAX_PAGES),
                page_delay_ms: env_or("TOURDATA_PAGE_DELAY_MS", DEFAULT_PAGE_DELAY_MS),
                timeout_secs: env_or("TOURDATA_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            },
            sources: SourceUrls {
                greentour: env_string(
                    "GREENTOUR_BASE_URL",
                    SourceType::GreenTour.default_base_url(),
                ),
                barrier_free: env_string(
                    "BARRIER_FREE_BASE_URL",
                    SourceType::BarrierFree.default_base_url(),
                ),
                base_tour: env_string(
                    "BASE_TOUR_BASE_URL",
                    SourceType::BaseTour.default_base_url(),
                ),
            },
            base_tour: BaseTourConfig {
                base_ym: env_string("BASE_TOUR_BASE_YM", DEFAULT_BASE_TOUR_BASE_YM),
                area_cd: env_string("BASE_TOUR_AREA_CD", DEFAULT_BASE_TOUR_AREA_CD),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                write_mode: write_mode_from_env()?,
            },
            output: OutputConfig {
                data_dir: PathBuf::from(env_string("TOURDATA_DATA_DIR", DEFAULT_DATA_DIR)),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Point every source at the same base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.sources = SourceUrls {
            greentour: base_url.clone(),
            barrier_free: base_url.clone(),
            base_tour: base_url,
        };
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.rows_per_page == 0 {
            return Err(SyncError::config("rows_per_page must be greater than 0"));
        }

        if self.api.max_pages == 0 {
            return Err(SyncError::config("max_pages must be greater than 0"));
        }

        for source in SourceType::ALL {
            let url = self.sources.for_source(source);
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SyncError::config(format!(
                    "Base URL for {} must be an http(s) URL, got '{}'",
                    source, url
                )));
            }
        }

        if self.base_tour.base_ym.len() != 6
            || !self.base_tour.base_ym.chars().all(|c| c.is_ascii_digit())
        {
            return Err(SyncError::config(format!(
                "BASE_TOUR_BASE_YM must be YYYYMM, got '{}'",
                self.base_tour.base_ym
            )));
        }

        if self.database.url.is_empty() {
            return Err(SyncError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        if self.database.write_mode == (WriteMode::Batched { batch_size: 0 }) {
            return Err(SyncError::config("Batch size must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    /// Defaults with an empty service key; fill it in before fetching
    fn default() -> Self {
        Self {
            api: ApiConfig {
                service_key: String::new(),
                mobile_os: DEFAULT_MOBILE_OS.to_string(),
                rows_per_page: DEFAULT_ROWS_PER_PAGE,
                max_pages: DEFAULT_MAX_PAGES,
                page_delay_ms: DEFAULT_PAGE_DELAY_MS,
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            },
            sources: SourceUrls {
                greentour: SourceType::GreenTour.default_base_url().to_string(),
                barrier_free: SourceType::BarrierFree.default_base_url().to_string(),
                base_tour: SourceType::BaseTour.default_base_url().to_string(),
            },
            base_tour: BaseTourConfig {
                base_ym: DEFAULT_BASE_TOUR_BASE_YM.to_string(),
                area_cd: DEFAULT_BASE_TOUR_AREA_CD.to_string(),
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                write_mode: WriteMode::default(),
            },
            output: OutputConfig {
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.api.service_key = "test-key".to_string();
        config
    }

    #[test]
    fn test_defaults_validate_without_key() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.api.require_service_key().is_err());
        assert_eq!(valid().api.require_service_key().ok(), Some("test-key"));
    }

    #[test]
    fn test_load_without_service_key() {
        std::env::remove_var("DATA_KEY_DECODING");

        let config = SyncConfig::load();
        assert!(config.is_ok());
        let err = config.ok().and_then(|c| c.api.require_service_key().err());
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("Configuration error: DATA_KEY_DECODING is not set")
        );
    }

    #[test]
    fn test_default_values() {
        let config = SyncConfig::default();
        assert_eq!(config.api.rows_per_page, 100);
        assert_eq!(config.api.max_pages, 50);
        assert_eq!(config.api.page_delay_ms, 100);
        assert_eq!(config.base_tour.base_ym, "202503");
        assert_eq!(config.base_tour.area_cd, "47");
        assert_eq!(
            config.sources.for_source(SourceType::BarrierFree),
            "https://apis.data.go.kr/B551011/KorWithService2"
        );
    }

    #[test]
    fn test_rejects_zero_paging() {
        let mut config = valid();
        config.api.rows_per_page = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.api.max_pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_base_ym() {
        let mut config = valid();
        config.base_tour.base_ym = "2025-03".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_batches() {
        let mut config = valid();
        config.database.write_mode = WriteMode::Batched { batch_size: 0 };
        assert!(config.validate().is_err());

        config.database.write_mode = WriteMode::Batched { batch_size: 50 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_base_url() {
        let config = valid().with_base_url("http://127.0.0.1:9000");
        for source in SourceType::ALL {
            assert_eq!(config.sources.for_source(source), "http://127.0.0.1:9000");
        }
        assert!(config.validate().is_ok());

        let config = valid().with_base_url("ftp://example");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_service_key() {
        let rendered = format!("{:?}", valid().api);
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
