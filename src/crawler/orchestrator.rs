//! Monitoring cycle orchestration
//!
//! One cycle takes a single site from validation through fetch, diff, commit,
//! history and notification:
//!
//! ```text
//! Init -> ConfigLoaded -> Fetching -> Diffing -> Committing -> NotifyPending -> Done
//! ```
//!
//! Sites that fail validation are reported as errors and leave no trace.
//! Every cycle that gets past validation appends exactly one history record
//! when storage allows it.

use crate::config::Config;
use crate::crawler::fetcher::{FetchOptions, Fetcher};
use crate::crawler::parser::SitemapEntry;
use crate::crawler::walker::SitemapWalker;
use crate::diff::{diff, DiffResult};
use crate::notify::{Notifier, NotifyError};
use crate::state::{CycleState, CycleTracker, RunStatus};
use crate::storage::{CommitSummary, NewCrawlRun, Site, Storage, StorageError, StorageResult};
use crate::WatchError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// What happened to the notification of a finished cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Nothing to report
    NotNeeded,
    /// The site has notifications turned off or no notifier is configured
    Disabled,
    /// Delivered
    Sent,
    /// Delivery failed; the cycle result stands
    Failed(String),
}

/// Result of one monitoring cycle that got past validation
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub site_id: i64,
    pub site_name: String,
    pub status: RunStatus,
    /// Pages recorded for the first time in this cycle
    pub new_pages: Vec<SitemapEntry>,
    pub reseen_count: usize,
    /// Sitemap documents fetched
    pub sitemap_count: usize,
    /// Sitemap documents that failed to fetch or parse
    pub failed_sitemap_count: usize,
    /// Sitemap references skipped by the walk ceilings
    pub truncated_count: usize,
    /// Summary on success, error text on failure
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub notification: NotificationOutcome,
    /// False when the history record could not be written
    pub history_recorded: bool,
}

impl CycleOutcome {
    pub fn new_count(&self) -> usize {
        self.new_pages.len()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Everything a successful fetch-diff-commit pass produced
struct Committed {
    diff: DiffResult,
    failed_sitemap_count: usize,
    truncated_count: usize,
    summary: CommitSummary,
}

/// Runs monitoring cycles for sites stored in a shared backend
///
/// The storage mutex is only held for synchronous sections and never across
/// an await, so one orchestrator can serve several concurrent cycles.
pub struct Orchestrator {
    config: Arc<Config>,
    storage: Arc<Mutex<dyn Storage>>,
    fetcher: Fetcher,
    notifier: Arc<dyn Notifier>,
    run_identifier: Option<String>,
}

impl Orchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration, immutable for the orchestrator's lifetime
    /// * `storage` - Shared persistence backend
    /// * `notifier` - Where new-page and error messages are sent
    pub fn new(
        config: Arc<Config>,
        storage: Arc<Mutex<dyn Storage>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let fetcher = Fetcher::new(&config.http);
        Self {
            config,
            storage,
            fetcher,
            notifier,
            run_identifier: None,
        }
    }

    /// Tags every history record written by this orchestrator
    pub fn with_run_identifier(mut self, run_identifier: Option<String>) -> Self {
        self.run_identifier = run_identifier.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one monitoring cycle for `site_id`
    ///
    /// # Arguments
    ///
    /// * `site_id` - Site to monitor
    /// * `cancel` - Aborts outstanding fetches; the cycle then ends `Failed`
    ///
    /// # Returns
    ///
    /// * `Ok(CycleOutcome)` - The cycle ran; its status may still be `Failed`
    /// * `Err(WatchError)` - The site could not be loaded or is not
    ///   monitorable. No history record was written.
    pub async fn run_cycle(
        &self,
        site_id: i64,
        cancel: &CancellationToken,
    ) -> crate::Result<CycleOutcome> {
        let mut tracker = CycleTracker::new(site_id);

        let (site, sitemap_url) = self.load_site(site_id)?;
        tracker.advance(CycleState::ConfigLoaded)?;

        let options = self.fetch_options(&site);
        let started_at = Utc::now();

        tracing::info!(
            site_id,
            site = %site.name,
            sitemap = %sitemap_url,
            "Starting monitoring cycle"
        );

        let deadline = self.config.runner.cycle_timeout();
        let result = match tokio::time::timeout(
            deadline,
            self.fetch_diff_commit(&site, &sitemap_url, options, started_at, &mut tracker, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WatchError::Timeout {
                site_id,
                seconds: self.config.runner.cycle_timeout_secs,
            }),
        };

        match result {
            Ok(committed) => {
                self.finish_success(&site, committed, started_at, &mut tracker)
                    .await
            }
            Err(err) => {
                tracker.fail();
                Ok(self.finish_failure(&site, err, started_at).await)
            }
        }
    }

    /// Validates that `site_id` names an enabled sitemap-mode site with a
    /// sitemap URL
    fn load_site(&self, site_id: i64) -> crate::Result<(Site, String)> {
        let site = self
            .with_storage(|storage| storage.load_enabled_site(site_id))?
            .ok_or(WatchError::SiteUnavailable { site_id })?;

        if !site.monitoring_mode.is_implemented() {
            return Err(WatchError::UnsupportedMode {
                site_id,
                mode: site.monitoring_mode,
            });
        }

        let sitemap_url = site
            .sitemap_url()
            .map(str::to_string)
            .ok_or(WatchError::MissingSitemapUrl { site_id })?;

        Ok((site, sitemap_url))
    }

    /// Resolves the user agent and proxy used for every request of a cycle
    ///
    /// The site override wins, then the configured default, then one pick
    /// from the rotation pool.
    fn fetch_options(&self, site: &Site) -> FetchOptions {
        let explicit = site
            .user_agent
            .as_deref()
            .filter(|agent| !agent.trim().is_empty())
            .or(self.config.http.default_user_agent.as_deref());

        FetchOptions {
            user_agent: Some(self.fetcher.choose_user_agent(explicit)),
            proxy: site.proxy_url(),
            timeout: None,
        }
    }

    async fn fetch_diff_commit(
        &self,
        site: &Site,
        sitemap_url: &str,
        options: FetchOptions,
        started_at: DateTime<Utc>,
        tracker: &mut CycleTracker,
        cancel: &CancellationToken,
    ) -> crate::Result<Committed> {
        let site_id = site.id;

        tracker.advance(CycleState::Fetching)?;
        let walker = SitemapWalker::new(&self.fetcher, options, self.config.walker.clone());
        let walk = walker
            .walk(sitemap_url, &site.base_url, cancel)
            .await
            .map_err(|_| WatchError::Cancelled { site_id })?;

        let sitemap_count = walk.processed_sitemap_count();
        let failed_sitemap_count = walk.failed.len();
        let truncated_count = walk.truncated;
        tracing::info!(
            site_id,
            entries = walk.entries.len(),
            sitemaps = sitemap_count,
            failed = failed_sitemap_count,
            truncated = truncated_count,
            "Sitemap walk finished"
        );

        tracker.advance(CycleState::Diffing)?;
        let existing = self.with_storage(|storage| storage.load_existing_urls(site_id))?;
        let result = diff(
            site_id,
            walk.entries,
            &existing,
            sitemap_count,
            self.config.diff.url_identity,
        );

        if cancel.is_cancelled() {
            return Err(WatchError::Cancelled { site_id });
        }

        tracker.advance(CycleState::Committing)?;
        let summary = self.with_storage(|storage| {
            storage.commit_diff(
                site_id,
                &result.new_pages,
                &result.reseen,
                started_at,
                Utc::now(),
            )
        })?;

        tracing::debug!(
            site_id,
            inserted = summary.inserted,
            refreshed = summary.refreshed,
            "Diff committed"
        );

        Ok(Committed {
            diff: result,
            failed_sitemap_count,
            truncated_count,
            summary,
        })
    }

    async fn finish_success(
        &self,
        site: &Site,
        committed: Committed,
        started_at: DateTime<Utc>,
        tracker: &mut CycleTracker,
    ) -> crate::Result<CycleOutcome> {
        tracker.advance(CycleState::NotifyPending)?;

        let Committed {
            diff: result,
            failed_sitemap_count,
            truncated_count,
            summary,
        } = committed;

        let mut message = format!(
            "Found {} new pages, {} already known, {} sitemaps processed",
            summary.inserted, summary.refreshed, result.processed_sitemap_count
        );
        if failed_sitemap_count > 0 {
            message.push_str(&format!(", {} failed", failed_sitemap_count));
        }
        if truncated_count > 0 {
            message.push_str(&format!(", {} skipped by limits", truncated_count));
        }

        let finished_at = Utc::now();
        let history_recorded = self.record_run(NewCrawlRun {
            site_id: site.id,
            started_at,
            finished_at,
            status: RunStatus::Success,
            pages_found_count: result.new_count() as u64,
            message: Some(message.clone()),
            run_identifier: self.run_identifier.clone(),
        });

        let notification = if result.new_pages.is_empty() {
            NotificationOutcome::NotNeeded
        } else if !self.should_notify(site) {
            NotificationOutcome::Disabled
        } else {
            let delivery = self.notifier.notify_new_pages(site, &result.new_pages).await;
            notification_outcome(site.id, delivery)
        };

        tracker.advance(CycleState::Done(RunStatus::Success))?;
        tracing::info!(
            site_id = site.id,
            new_pages = result.new_count(),
            reseen = result.reseen_count(),
            "Cycle succeeded"
        );

        Ok(CycleOutcome {
            site_id: site.id,
            site_name: site.name.clone(),
            status: RunStatus::Success,
            reseen_count: result.reseen_count(),
            sitemap_count: result.processed_sitemap_count,
            new_pages: result.new_pages,
            failed_sitemap_count,
            truncated_count,
            message,
            started_at,
            finished_at,
            notification,
            history_recorded,
        })
    }

    async fn finish_failure(
        &self,
        site: &Site,
        err: WatchError,
        started_at: DateTime<Utc>,
    ) -> CycleOutcome {
        let message = err.to_string();
        tracing::error!(site_id = site.id, error = %err, "Cycle failed");

        let finished_at = Utc::now();
        let history_recorded = self.record_run(NewCrawlRun {
            site_id: site.id,
            started_at,
            finished_at,
            status: RunStatus::Failed,
            pages_found_count: 0,
            message: Some(message.clone()),
            run_identifier: self.run_identifier.clone(),
        });

        let notification = if self.should_notify(site) {
            let delivery = self.notifier.notify_error(site, &message).await;
            notification_outcome(site.id, delivery)
        } else {
            NotificationOutcome::Disabled
        };

        CycleOutcome {
            site_id: site.id,
            site_name: site.name.clone(),
            status: RunStatus::Failed,
            new_pages: Vec::new(),
            reseen_count: 0,
            sitemap_count: 0,
            failed_sitemap_count: 0,
            truncated_count: 0,
            message,
            started_at,
            finished_at,
            notification,
            history_recorded,
        }
    }

    /// Appends a history record, logging instead of failing
    fn record_run(&self, run: NewCrawlRun) -> bool {
        match self.with_storage(|storage| storage.append_crawl_run(&run)) {
            Ok(run_id) => {
                tracing::debug!(site_id = run.site_id, run_id, status = %run.status, "History recorded");
                true
            }
            Err(e) => {
                tracing::error!(
                    site_id = run.site_id,
                    status = %run.status,
                    error = %e,
                    "Failed to record crawl history"
                );
                false
            }
        }
    }

    fn should_notify(&self, site: &Site) -> bool {
        site.notifications_enabled && self.notifier.is_enabled()
    }

    /// Runs a synchronous storage operation under the shared lock
    fn with_storage<T, F>(&self, op: F) -> crate::Result<T>
    where
        F: FnOnce(&mut dyn Storage) -> StorageResult<T>,
    {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(op(&mut *storage)?)
    }
}

fn notification_outcome(site_id: i64, result: Result<(), NotifyError>) -> NotificationOutcome {
    match result {
        Ok(()) => NotificationOutcome::Sent,
        Err(e) => {
            tracing::warn!(site_id, error = %e, "Notification failed");
            NotificationOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MonitoringMode, NewSite, SqliteStorage};
    use async_trait::async_trait;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
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

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.http.politeness_delay_ms = 0;
        config.http.backoff_base_ms = 1;
        config.http.backoff_cap_ms = 2;
        config.http.timeout_secs = 5;
        config.runner.site_delay_ms = 0;
        config
    }

    fn setup(config: Config) -> (Orchestrator, Arc<Mutex<SqliteStorage>>, Arc<RecordingNotifier>) {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Orchestrator::new(Arc::new(config), storage.clone(), notifier.clone());
        (orchestrator, storage, notifier)
    }

    fn urlset(locs: &[String]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
        );
        for loc in locs {
            xml.push_str(&format!("<url><loc>{}</loc></url>", loc));
        }
        xml.push_str("</urlset>");
        xml
    }

    fn add_site(storage: &Arc<Mutex<SqliteStorage>>, site: NewSite) -> i64 {
        storage.lock().unwrap().insert_site(&site).unwrap()
    }

    fn history_len(storage: &Arc<Mutex<SqliteStorage>>, site_id: i64) -> usize {
        storage.lock().unwrap().recent_runs(site_id, 100).unwrap().len()
    }

    #[tokio::test]
    async fn test_unknown_site_is_init_error() {
        let (orchestrator, storage, _) = setup(fast_config());
        let cancel = CancellationToken::new();

        let result = orchestrator.run_cycle(42, &cancel).await;
        assert!(matches!(result, Err(WatchError::SiteUnavailable { site_id: 42 })));
        assert_eq!(history_len(&storage, 42), 0);
    }

    #[tokio::test]
    async fn test_disabled_site_is_init_error() {
        let (orchestrator, storage, notifier) = setup(fast_config());
        let mut site = NewSite::sitemap("Off", "https://example.com", "https://example.com/sitemap.xml");
        site.enabled = false;
        let site_id = add_site(&storage, site);

        let result = orchestrator.run_cycle(site_id, &CancellationToken::new()).await;
        assert!(matches!(result, Err(WatchError::SiteUnavailable { .. })));
        assert_eq!(history_len(&storage, site_id), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_mode_is_init_error() {
        let (orchestrator, storage, _) = setup(fast_config());
        let mut site = NewSite::sitemap("Crawl", "https://example.com", "https://example.com/sitemap.xml");
        site.monitoring_mode = MonitoringMode::FullCrawl;
        let site_id = add_site(&storage, site);

        let err = orchestrator
            .run_cycle(site_id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::UnsupportedMode {
                mode: MonitoringMode::FullCrawl,
                ..
            }
        ));
        assert!(err.is_site_config());
        assert_eq!(history_len(&storage, site_id), 0);
    }

    #[tokio::test]
    async fn test_blank_sitemap_url_is_init_error() {
        let (orchestrator, storage, _) = setup(fast_config());
        let mut site = NewSite::sitemap("Blank", "https://example.com", "");
        site.sitemap_url = Some("   ".to_string());
        let site_id = add_site(&storage, site);

        let result = orchestrator.run_cycle(site_id, &CancellationToken::new()).await;
        assert!(matches!(result, Err(WatchError::MissingSitemapUrl { .. })));
        assert_eq!(history_len(&storage, site_id), 0);
    }

    #[tokio::test]
    async fn test_successful_cycle_records_and_notifies() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[
                format!("{}/a", base),
                format!("{}/b", base),
            ])))
            .mount(&server)
            .await;

        let (orchestrator, storage, notifier) = setup(fast_config());
        let orchestrator = orchestrator.with_run_identifier(Some("run-7".to_string()));
        let site_id = add_site(
            &storage,
            NewSite::sitemap("Example", &base, &format!("{}/sitemap.xml", base)),
        );

        let outcome = orchestrator
            .run_cycle(site_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.new_count(), 2);
        assert_eq!(outcome.sitemap_count, 1);
        assert_eq!(outcome.notification, NotificationOutcome::Sent);
        assert!(outcome.history_recorded);

        let runs = storage.lock().unwrap().recent_runs(site_id, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].pages_found_count, 2);
        assert_eq!(runs[0].run_identifier.as_deref(), Some("run-7"));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(&format!("{}/a", base)));
    }

    #[tokio::test]
    async fn test_no_new_pages_sends_nothing() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[format!("{}/a", base)])))
            .mount(&server)
            .await;

        let (orchestrator, storage, notifier) = setup(fast_config());
        let site_id = add_site(
            &storage,
            NewSite::sitemap("Example", &base, &format!("{}/sitemap.xml", base)),
        );
        let cancel = CancellationToken::new();

        orchestrator.run_cycle(site_id, &cancel).await.unwrap();
        let second = orchestrator.run_cycle(site_id, &cancel).await.unwrap();

        assert_eq!(second.new_count(), 0);
        assert_eq!(second.reseen_count, 1);
        assert_eq!(second.notification, NotificationOutcome::NotNeeded);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(history_len(&storage, site_id), 2);
    }

    #[tokio::test]
    async fn test_site_with_notifications_off() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[format!("{}/a", base)])))
            .mount(&server)
            .await;

        let (orchestrator, storage, notifier) = setup(fast_config());
        let mut site = NewSite::sitemap("Quiet", &base, &format!("{}/sitemap.xml", base));
        site.notifications_enabled = false;
        let site_id = add_site(&storage, site);

        let outcome = orchestrator
            .run_cycle(site_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.new_count(), 1);
        assert_eq!(outcome.notification, NotificationOutcome::Disabled);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_site_user_agent_override_sent() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .and(wiremock::matchers::header("user-agent", "SiteBot/2.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[format!("{}/a", base)])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = fast_config();
        config.http.default_user_agent = Some("DefaultBot/1.0".to_string());
        let (orchestrator, storage, _) = setup(config);
        let mut site = NewSite::sitemap("Agent", &base, &format!("{}/sitemap.xml", base));
        site.user_agent = Some("SiteBot/2.0".to_string());
        let site_id = add_site(&storage, site);

        let outcome = orchestrator
            .run_cycle(site_id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.new_count(), 1);
    }

    #[tokio::test]
    async fn test_walk_ceiling_reported_in_message() {
        let server = MockServer::start().await;
        let base = server.uri();
        let index = format!(
            r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"><sitemap><loc>{0}/a.xml</loc></sitemap><sitemap><loc>{0}/b.xml</loc></sitemap></sitemapindex>"#,
            base
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        for leaf in ["/a.xml", "/b.xml"] {
            Mock::given(method("GET"))
                .and(path(leaf))
                .respond_with(
                    ResponseTemplate::new(200).set_body_string(urlset(&[format!("{}{}-page", base, leaf)])),
                )
                .mount(&server)
                .await;
        }

        let mut config = fast_config();
        config.walker.max_sitemaps = 2;
        let (orchestrator, storage, _) = setup(config);
        let site_id = add_site(
            &storage,
            NewSite::sitemap("Capped", &base, &format!("{}/sitemap.xml", base)),
        );

        let outcome = orchestrator
            .run_cycle(site_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.sitemap_count, 2);
        assert_eq!(outcome.truncated_count, 1);
        assert!(outcome.message.ends_with(", 1 skipped by limits"));

        let runs = storage.lock().unwrap().recent_runs(site_id, 10).unwrap();
        assert_eq!(runs[0].message.as_deref(), Some(outcome.message.as_str()));
    }

    #[tokio::test]
    async fn test_deadline_fails_cycle_without_commit() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(urlset(&[format!("{}/a", base)]))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut config = fast_config();
        config.runner.cycle_timeout_secs = 1;
        let (orchestrator, storage, notifier) = setup(config);
        let site_id = add_site(
            &storage,
            NewSite::sitemap("Slow", &base, &format!("{}/sitemap.xml", base)),
        );

        let outcome = orchestrator
            .run_cycle(site_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.message.contains("timed out"));
        assert_eq!(storage.lock().unwrap().count_pages(site_id).unwrap(), 0);
        assert_eq!(history_len(&storage, site_id), 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
