//! Storage module for persisting monitoring data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Monitored site records
//! - Discovered page records, unique per site
//! - Append-only crawl history

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::state::RunStatus;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// How a site is monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitoringMode {
    /// Discover pages from the site's XML sitemap
    Sitemap,
    /// Reserved: crawl every page of the site
    FullCrawl,
    /// Reserved: crawl a subset of the site
    PartialCrawl,
}

impl MonitoringMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::FullCrawl => "full_crawl",
            Self::PartialCrawl => "partial_crawl",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "sitemap" => Some(Self::Sitemap),
            "full_crawl" => Some(Self::FullCrawl),
            "partial_crawl" => Some(Self::PartialCrawl),
            _ => None,
        }
    }

    /// Returns true if monitoring cycles can run in this mode
    pub fn is_implemented(&self) -> bool {
        matches!(self, Self::Sitemap)
    }
}

impl fmt::Display for MonitoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Error returned when a monitoring mode name is not recognized
#[derive(Debug, Clone, Error)]
#[error("Unknown monitoring mode: {0}")]
pub struct UnknownModeError(pub String);

impl FromStr for MonitoringMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::from_db_string(&normalized).ok_or_else(|| UnknownModeError(s.to_string()))
    }
}

/// Per-site proxy settings as stored in `proxy_config_json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// Represents a monitored site in the database
#[derive(Debug, Clone)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub sitemap_url: Option<String>,
    pub monitoring_mode: MonitoringMode,
    pub user_agent: Option<String>,
    pub proxy_config_json: Option<String>,
    pub enabled: bool,
    pub notifications_enabled: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    /// Returns the proxy URL from the site's proxy configuration
    ///
    /// Unparseable configuration is logged and treated as no proxy.
    pub fn proxy_url(&self) -> Option<String> {
        let raw = self.proxy_config_json.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        match serde_json::from_str::<ProxyConfig>(raw) {
            Ok(config) => config.proxy_url.filter(|url| !url.trim().is_empty()),
            Err(e) => {
                tracing::warn!(
                    site_id = self.id,
                    error = %e,
                    "Ignoring invalid proxy configuration"
                );
                None
            }
        }
    }

    /// Returns the configured sitemap URL if it is present and non-blank
    pub fn sitemap_url(&self) -> Option<&str> {
        self.sitemap_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Fields needed to register a new site
#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub base_url: String,
    pub sitemap_url: Option<String>,
    pub monitoring_mode: MonitoringMode,
    pub user_agent: Option<String>,
    pub proxy_url: Option<String>,
    pub enabled: bool,
    pub notifications_enabled: bool,
}

impl NewSite {
    /// A sitemap-mode site with notifications enabled
    pub fn sitemap(name: &str, base_url: &str, sitemap_url: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            sitemap_url: Some(sitemap_url.to_string()),
            monitoring_mode: MonitoringMode::Sitemap,
            user_agent: None,
            proxy_url: None,
            enabled: true,
            notifications_enabled: true,
        }
    }

    /// Serializes the proxy settings for storage
    pub fn proxy_config_json(&self) -> StorageResult<Option<String>> {
        match &self.proxy_url {
            Some(url) => {
                let config = ProxyConfig {
                    proxy_url: Some(url.clone()),
                };
                serde_json::to_string(&config)
                    .map(Some)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }
}

/// Represents a discovered page in the database
#[derive(Debug, Clone)]
pub struct DiscoveredPage {
    pub id: i64,
    pub site_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub first_discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_modified: Option<DateTime<FixedOffset>>,
    pub processed: bool,
}

/// Represents one recorded cycle in crawl history
#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub id: i64,
    pub site_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub pages_found_count: u64,
    pub message: Option<String>,
    pub run_identifier: Option<String>,
}

/// A crawl history record about to be appended
#[derive(Debug, Clone)]
pub struct NewCrawlRun {
    pub site_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub pages_found_count: u64,
    pub message: Option<String>,
    pub run_identifier: Option<String>,
}

/// Row counts written by one diff commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub refreshed: usize,
}
