//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::SitemapEntry;
use crate::storage::{CommitSummary, CrawlRun, DiscoveredPage, NewCrawlRun, NewSite, Site};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Site not found: {0}")]
    SiteNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the monitor. Callers
/// share one backend across sites behind a mutex, so implementations must be
/// `Send`.
pub trait Storage: Send {
    // ===== Site Management =====

    /// Registers a new site
    ///
    /// # Returns
    ///
    /// The ID of the newly created site
    fn insert_site(&mut self, site: &NewSite) -> StorageResult<i64>;

    /// Gets a site by ID regardless of its enabled flag
    fn get_site(&self, site_id: i64) -> StorageResult<Option<Site>>;

    /// Gets a site by ID only if it is enabled
    fn load_enabled_site(&self, site_id: i64) -> StorageResult<Option<Site>>;

    /// Lists all sites ordered by ID
    fn list_sites(&self) -> StorageResult<Vec<Site>>;

    /// Lists enabled sites ordered by ID
    fn list_enabled_sites(&self) -> StorageResult<Vec<Site>>;

    /// Enables or disables a site
    fn set_site_enabled(&mut self, site_id: i64, enabled: bool) -> StorageResult<()>;

    // ===== Page Management =====

    /// Loads every recorded URL for a site with its last-seen time
    fn load_existing_urls(&self, site_id: i64) -> StorageResult<HashMap<String, DateTime<Utc>>>;

    /// Applies one diff result atomically
    ///
    /// Inserts `new_pages` with first-seen and last-seen set to `observed_at`,
    /// refreshes last-seen (and the last-modified hint, when present) for
    /// `reseen`, and sets the site's last-crawled time. Either every change is
    /// applied or none is.
    ///
    /// # Arguments
    ///
    /// * `site_id` - The site being committed
    /// * `new_pages` - Entries not recorded before
    /// * `reseen` - Entries already recorded, keyed by their stored URL
    /// * `observed_at` - Cycle start time
    /// * `last_crawled` - New value for the site's last-crawled time
    fn commit_diff(
        &mut self,
        site_id: i64,
        new_pages: &[SitemapEntry],
        reseen: &[SitemapEntry],
        observed_at: DateTime<Utc>,
        last_crawled: DateTime<Utc>,
    ) -> StorageResult<CommitSummary>;

    /// Gets the most recently discovered pages for a site
    fn get_pages(&self, site_id: i64, limit: usize) -> StorageResult<Vec<DiscoveredPage>>;

    /// Counts recorded pages for a site
    fn count_pages(&self, site_id: i64) -> StorageResult<u64>;

    // ===== Crawl History =====

    /// Appends a crawl history record
    ///
    /// # Returns
    ///
    /// The ID of the new record
    fn append_crawl_run(&mut self, run: &NewCrawlRun) -> StorageResult<i64>;

    /// Gets the most recent history records for a site, newest first
    fn recent_runs(&self, site_id: i64, limit: usize) -> StorageResult<Vec<CrawlRun>>;
}
