//! Sitemap-Watch: sitemap-driven new page discovery
//!
//! This crate watches monitored websites for newly published pages. Each
//! monitoring cycle walks a site's sitemap tree, diffs the URLs it finds against
//! what was recorded before, commits the result, and notifies about new pages
//! or failures.

pub mod config;
pub mod crawler;
pub mod diff;
pub mod notify;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sitemap-Watch operations
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Site {site_id} not found or not enabled")]
    SiteUnavailable { site_id: i64 },

    #[error("Site {site_id} uses monitoring mode '{mode}', which is not implemented")]
    UnsupportedMode {
        site_id: i64,
        mode: storage::MonitoringMode,
    },

    #[error("Site {site_id} has no sitemap URL configured")]
    MissingSitemapUrl { site_id: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Cycle for site {site_id} timed out after {seconds}s")]
    Timeout { site_id: i64, seconds: u64 },

    #[error("Cycle for site {site_id} was cancelled")]
    Cancelled { site_id: i64 },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CycleState,
        to: state::CycleState,
    },
}

impl WatchError {
    /// Returns true for errors raised while validating a site before a cycle
    /// starts. These never produce a history record.
    pub fn is_site_config(&self) -> bool {
        matches!(
            self,
            Self::SiteUnavailable { .. } | Self::UnsupportedMode { .. } | Self::MissingSitemapUrl { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Sitemap-Watch operations
pub type Result<T> = std::result::Result<T, WatchError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CycleOutcome, Orchestrator, SitemapEntry};
pub use diff::{diff, DiffResult};
pub use state::{CycleState, RunStatus};
