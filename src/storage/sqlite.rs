//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::SitemapEntry;
use crate::state::RunStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CommitSummary, CrawlRun, DiscoveredPage, MonitoringMode, NewCrawlRun, NewSite, Site,
};
use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const SITE_COLUMNS: &str = "id, name, base_url, sitemap_url, monitoring_mode, user_agent,
     proxy_config_json, is_enabled, is_notification_enabled, last_crawled_at, created_at";

const PAGE_COLUMNS: &str = "id, site_id, url, title, first_discovered_at, last_seen_at,
     last_modified, is_processed";

const RUN_COLUMNS: &str = "id, site_id, started_at, finished_at, status, pages_found_count,
     message, run_identifier";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_sites(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<Site>> {
        let sql = format!("SELECT {} FROM sites {} ORDER BY id", SITE_COLUMNS, filter);
        let mut stmt = self.conn.prepare(&sql)?;
        let sites = stmt
            .query_map(args, site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }
}

impl Storage for SqliteStorage {
    // ===== Site Management =====

    fn insert_site(&mut self, site: &NewSite) -> StorageResult<i64> {
        let proxy_json = site.proxy_config_json()?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO sites (name, base_url, sitemap_url, monitoring_mode, user_agent,
             proxy_config_json, is_enabled, is_notification_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                site.name,
                site.base_url,
                site.sitemap_url,
                site.monitoring_mode.to_db_string(),
                site.user_agent,
                proxy_json,
                site.enabled,
                site.notifications_enabled,
                now
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_site(&self, site_id: i64) -> StorageResult<Option<Site>> {
        let sql = format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS);
        let site = self
            .conn
            .query_row(&sql, params![site_id], site_from_row)
            .optional()?;
        Ok(site)
    }

    fn load_enabled_site(&self, site_id: i64) -> StorageResult<Option<Site>> {
        let sql = format!(
            "SELECT {} FROM sites WHERE id = ?1 AND is_enabled = 1",
            SITE_COLUMNS
        );
        let site = self
            .conn
            .query_row(&sql, params![site_id], site_from_row)
            .optional()?;
        Ok(site)
    }

    fn list_sites(&self) -> StorageResult<Vec<Site>> {
        self.query_sites("", &[])
    }

    fn list_enabled_sites(&self) -> StorageResult<Vec<Site>> {
        self.query_sites("WHERE is_enabled = 1", &[])
    }

    fn set_site_enabled(&mut self, site_id: i64, enabled: bool) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sites SET is_enabled = ?1 WHERE id = ?2",
            params![enabled, site_id],
        )?;

        if updated == 0 {
            return Err(StorageError::SiteNotFound(site_id));
        }
        Ok(())
    }

    // ===== Page Management =====

    fn load_existing_urls(&self, site_id: i64) -> StorageResult<HashMap<String, DateTime<Utc>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, last_seen_at FROM discovered_pages WHERE site_id = ?1")?;

        let rows = stmt.query_map(params![site_id], |row| {
            let url: String = row.get(0)?;
            let last_seen = parse_utc(1, row.get(1)?)?;
            Ok((url, last_seen))
        })?;

        let mut urls = HashMap::new();
        for row in rows {
            let (url, last_seen) = row?;
            urls.insert(url, last_seen);
        }
        Ok(urls)
    }

    fn commit_diff(
        &mut self,
        site_id: i64,
        new_pages: &[SitemapEntry],
        reseen: &[SitemapEntry],
        observed_at: DateTime<Utc>,
        last_crawled: DateTime<Utc>,
    ) -> StorageResult<CommitSummary> {
        let observed = observed_at.to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut summary = CommitSummary::default();

        {
            let mut insert = tx.prepare(
                "INSERT INTO discovered_pages
                 (site_id, url, title, first_discovered_at, last_seen_at, last_modified, is_processed)
                 VALUES (?1, ?2, NULL, ?3, ?3, ?4, 0)",
            )?;
            for entry in new_pages {
                let lastmod = entry.lastmod.map(|d| d.to_rfc3339());
                insert
                    .execute(params![site_id, entry.url, observed, lastmod])
                    .map_err(|e| constraint_or_sqlite(e, &entry.url))?;
                summary.inserted += 1;
            }

            let mut refresh = tx.prepare(
                "UPDATE discovered_pages
                 SET last_seen_at = ?1, last_modified = COALESCE(?2, last_modified)
                 WHERE site_id = ?3 AND url = ?4",
            )?;
            for entry in reseen {
                let lastmod = entry.lastmod.map(|d| d.to_rfc3339());
                summary.refreshed += refresh.execute(params![observed, lastmod, site_id, entry.url])?;
            }
        }

        let updated = tx.execute(
            "UPDATE sites SET last_crawled_at = ?1 WHERE id = ?2",
            params![last_crawled.to_rfc3339(), site_id],
        )?;
        if updated == 0 {
            return Err(StorageError::SiteNotFound(site_id));
        }

        tx.commit()?;
        Ok(summary)
    }

    fn get_pages(&self, site_id: i64, limit: usize) -> StorageResult<Vec<DiscoveredPage>> {
        let sql = format!(
            "SELECT {} FROM discovered_pages WHERE site_id = ?1
             ORDER BY first_discovered_at DESC, id DESC LIMIT ?2",
            PAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let pages = stmt
            .query_map(params![site_id, limit as i64], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    fn count_pages(&self, site_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM discovered_pages WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Crawl History =====

    fn append_crawl_run(&mut self, run: &NewCrawlRun) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO crawl_runs
             (site_id, started_at, finished_at, status, pages_found_count, message, run_identifier)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.site_id,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.status.to_db_string(),
                run.pages_found_count as i64,
                run.message,
                run.run_identifier
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent_runs(&self, site_id: i64, limit: usize) -> StorageResult<Vec<CrawlRun>> {
        let sql = format!(
            "SELECT {} FROM crawl_runs WHERE site_id = ?1 ORDER BY id DESC LIMIT ?2",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![site_id, limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    let mode: String = row.get(4)?;
    let monitoring_mode =
        MonitoringMode::from_db_string(&mode).ok_or_else(|| unknown_value(4, "monitoring mode", &mode))?;

    let last_crawled: Option<String> = row.get(9)?;

    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        sitemap_url: row.get(3)?,
        monitoring_mode,
        user_agent: row.get(5)?,
        proxy_config_json: row.get(6)?,
        enabled: row.get(7)?,
        notifications_enabled: row.get(8)?,
        last_crawled_at: last_crawled.map(|s| parse_utc(9, s)).transpose()?,
        created_at: parse_utc(10, row.get(10)?)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<DiscoveredPage> {
    let last_modified: Option<String> = row.get(6)?;

    Ok(DiscoveredPage {
        id: row.get(0)?,
        site_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        first_discovered_at: parse_utc(4, row.get(4)?)?,
        last_seen_at: parse_utc(5, row.get(5)?)?,
        last_modified: last_modified.map(|s| parse_fixed(6, s)).transpose()?,
        processed: row.get(7)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRun> {
    let status: String = row.get(4)?;
    let status =
        RunStatus::from_db_string(&status).ok_or_else(|| unknown_value(4, "run status", &status))?;
    let pages_found: i64 = row.get(5)?;

    Ok(CrawlRun {
        id: row.get(0)?,
        site_id: row.get(1)?,
        started_at: parse_utc(2, row.get(2)?)?,
        finished_at: parse_utc(3, row.get(3)?)?,
        status,
        pages_found_count: pages_found.max(0) as u64,
        message: row.get(6)?,
        run_identifier: row.get(7)?,
    })
}

fn parse_fixed(idx: usize, value: String) -> rusqlite::Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_utc(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    parse_fixed(idx, value).map(|d| d.with_timezone(&Utc))
}

fn unknown_value(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(StorageError::Database(format!("unknown {}: {}", what, value))),
    )
}

fn constraint_or_sqlite(err: rusqlite::Error, url: &str) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(format!("page already recorded: {}", url))
        }
        _ => StorageError::Sqlite(err),
    }
}
