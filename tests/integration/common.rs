//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sitemap_watch::config::Config;
use sitemap_watch::crawler::{Orchestrator, SitemapEntry};
use sitemap_watch::notify::{Notifier, NotifyError};
use sitemap_watch::storage::{
    CommitSummary, CrawlRun, DiscoveredPage, NewCrawlRun, NewSite, Site, SqliteStorage, Storage,
    StorageError, StorageResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration with every delay reduced to (almost) nothing
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.http.politeness_delay_ms = 0;
    config.http.backoff_base_ms = 1;
    config.http.backoff_cap_ms = 2;
    config.http.timeout_secs = 5;
    config.runner.site_delay_ms = 0;
    config
}

pub fn urlset(locs: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!(
            "<url><loc>{}</loc><lastmod>2024-05-01</lastmod></url>",
            loc
        ));
    }
    xml.push_str("</urlset>");
    xml
}

pub fn sitemap_index(locs: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("<sitemap><loc>{}</loc></sitemap>", loc));
    }
    xml.push_str("</sitemapindex>");
    xml
}

/// Serves `body` at `route` for every GET
pub async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Page URLs on the mock server
pub fn pages(server: &MockServer, paths: &[&str]) -> Vec<String> {
    paths
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect()
}

/// Notifier that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Notifier whose endpoint always fails
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send_text(&self, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Status(500))
    }
}

/// SQLite storage whose diff commits always fail
pub struct FailingCommitStorage {
    pub inner: SqliteStorage,
}

impl Storage for FailingCommitStorage {
    fn insert_site(&mut self, site: &NewSite) -> StorageResult<i64> {
        self.inner.insert_site(site)
    }

    fn get_site(&self, site_id: i64) -> StorageResult<Option<Site>> {
        self.inner.get_site(site_id)
    }

    fn load_enabled_site(&self, site_id: i64) -> StorageResult<Option<Site>> {
        self.inner.load_enabled_site(site_id)
    }

    fn list_sites(&self) -> StorageResult<Vec<Site>> {
        self.inner.list_sites()
    }

    fn list_enabled_sites(&self) -> StorageResult<Vec<Site>> {
        self.inner.list_enabled_sites()
    }

    fn set_site_enabled(&mut self, site_id: i64, enabled: bool) -> StorageResult<()> {
        self.inner.set_site_enabled(site_id, enabled)
    }

    fn load_existing_urls(&self, site_id: i64) -> StorageResult<HashMap<String, DateTime<Utc>>> {
        self.inner.load_existing_urls(site_id)
    }

    fn commit_diff(
        &mut self,
        _site_id: i64,
        _new_pages: &[SitemapEntry],
        _reseen: &[SitemapEntry],
        _observed_at: DateTime<Utc>,
        _last_crawled: DateTime<Utc>,
    ) -> StorageResult<CommitSummary> {
        Err(StorageError::Database("disk I/O error".to_string()))
    }

    fn get_pages(&self, site_id: i64, limit: usize) -> StorageResult<Vec<DiscoveredPage>> {
        self.inner.get_pages(site_id, limit)
    }

    fn count_pages(&self, site_id: i64) -> StorageResult<u64> {
        self.inner.count_pages(site_id)
    }

    fn append_crawl_run(&mut self, run: &NewCrawlRun) -> StorageResult<i64> {
        self.inner.append_crawl_run(run)
    }

    fn recent_runs(&self, site_id: i64, limit: usize) -> StorageResult<Vec<CrawlRun>> {
        self.inner.recent_runs(site_id, limit)
    }
}

/// Orchestrator over in-memory SQLite with a recording notifier
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub storage: Arc<Mutex<SqliteStorage>>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Orchestrator::new(Arc::new(config), storage.clone(), notifier.clone());
        Self {
            orchestrator,
            storage,
            notifier,
        }
    }

    pub fn add_site(&self, site: NewSite) -> i64 {
        self.storage.lock().unwrap().insert_site(&site).unwrap()
    }

    pub fn count_pages(&self, site_id: i64) -> u64 {
        self.storage.lock().unwrap().count_pages(site_id).unwrap()
    }

    pub fn runs(&self, site_id: i64) -> Vec<CrawlRun> {
        self.storage.lock().unwrap().recent_runs(site_id, 100).unwrap()
    }
}
