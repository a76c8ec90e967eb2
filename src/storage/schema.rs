//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sitemap-Watch
//! database. Timestamps are stored as RFC 3339 text.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Monitored sites
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    base_url TEXT NOT NULL,
    sitemap_url TEXT,
    monitoring_mode TEXT NOT NULL DEFAULT 'sitemap',
    user_agent TEXT,
    proxy_config_json TEXT,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    is_notification_enabled INTEGER NOT NULL DEFAULT 1,
    last_crawled_at TEXT,
    created_at TEXT NOT NULL
);

-- Every URL ever seen in a site's sitemaps
CREATE TABLE IF NOT EXISTS discovered_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES sites(id),
    url TEXT NOT NULL,
    title TEXT,
    first_discovered_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    last_modified TEXT,
    is_processed INTEGER NOT NULL DEFAULT 0,
    UNIQUE(site_id, url)
);

CREATE INDEX IF NOT EXISTS idx_discovered_pages_site ON discovered_pages(site_id);
CREATE INDEX IF NOT EXISTS idx_discovered_pages_first_seen
    ON discovered_pages(site_id, first_discovered_at);

-- Append-only cycle history
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES sites(id),
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_found_count INTEGER NOT NULL DEFAULT 0,
    message TEXT,
    run_identifier TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_site ON crawl_runs(site_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
