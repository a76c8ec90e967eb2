//! Monitoring cycles that fail, get cancelled, or lose their notifications

use crate::common::{
    fast_config, pages, serve, urlset, FailingCommitStorage, FailingNotifier, Harness,
    RecordingNotifier,
};
use sitemap_watch::config::NotifyConfig;
use sitemap_watch::crawler::{run_sites, NotificationOutcome, Orchestrator, SiteReport};
use sitemap_watch::notify::{DisabledNotifier, WebhookNotifier};
use sitemap_watch::storage::{MonitoringMode, NewSite, SqliteStorage, Storage};
use sitemap_watch::{RunStatus, WatchError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_commit_failure_fails_cycle_and_notifies() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a", "/b"]))).await;

    let storage = Arc::new(Mutex::new(FailingCommitStorage {
        inner: SqliteStorage::new_in_memory().unwrap(),
    }));
    let site_id = storage
        .lock()
        .unwrap()
        .insert_site(&NewSite::sitemap(
            "Broken",
            &server.uri(),
            &format!("{}/sitemap.xml", server.uri()),
        ))
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = Orchestrator::new(
        Arc::new(fast_config()),
        storage.clone(),
        notifier.clone(),
    );

    let outcome = orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.message.contains("disk I/O error"));
    assert!(outcome.history_recorded);
    assert_eq!(outcome.notification, NotificationOutcome::Sent);

    let storage = storage.lock().unwrap();
    assert_eq!(storage.count_pages(site_id).unwrap(), 0);

    let runs = storage.recent_runs(site_id, 10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].pages_found_count, 0);

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("disk I/O error"));
}

#[tokio::test]
async fn test_notification_failure_is_not_fatal() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a"]))).await;

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let site_id = storage
        .lock()
        .unwrap()
        .insert_site(&NewSite::sitemap(
            "Example",
            &server.uri(),
            &format!("{}/sitemap.xml", server.uri()),
        ))
        .unwrap();

    let orchestrator = Orchestrator::new(
        Arc::new(fast_config()),
        storage.clone(),
        Arc::new(FailingNotifier),
    );

    let outcome = orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert!(matches!(outcome.notification, NotificationOutcome::Failed(_)));
    assert_eq!(storage.lock().unwrap().count_pages(site_id).unwrap(), 1);
}

#[tokio::test]
async fn test_init_failures_write_no_history() {
    let harness = Harness::new(fast_config());

    let mut crawl = NewSite::sitemap("Crawl", "https://example.com", "https://example.com/s.xml");
    crawl.monitoring_mode = MonitoringMode::FullCrawl;
    let crawl_id = harness.add_site(crawl);

    let mut missing = NewSite::sitemap("Missing", "https://example.com", "");
    missing.sitemap_url = None;
    let missing_id = harness.add_site(missing);

    let cancel = CancellationToken::new();
    for site_id in [crawl_id, missing_id, 999] {
        let err = harness
            .orchestrator
            .run_cycle(site_id, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_site_config(), "unexpected error: {}", err);
        assert!(harness.runs(site_id).is_empty());
    }

    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_missing_sitemap_url_error() {
    let harness = Harness::new(fast_config());
    let mut site = NewSite::sitemap("Missing", "https://example.com", "");
    site.sitemap_url = None;
    let site_id = harness.add_site(site);

    let result = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(WatchError::MissingSitemapUrl { .. })));
}

#[tokio::test]
async fn test_cancellation_fails_cycle_without_commit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(urlset(&pages(&server, &["/a"])))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(NewSite::sitemap(
        "Slow",
        &server.uri(),
        &format!("{}/sitemap.xml", server.uri()),
    ));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.message.contains("cancelled"));
    assert_eq!(harness.count_pages(site_id), 0);

    let runs = harness.runs(site_id);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_run_sites_mixes_outcomes() {
    let server = MockServer::start().await;
    serve(&server, "/good.xml", urlset(&pages(&server, &["/a"]))).await;
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut storage = SqliteStorage::new_in_memory().unwrap();
    let good = storage
        .insert_site(&NewSite::sitemap(
            "Good",
            &server.uri(),
            &format!("{}/good.xml", server.uri()),
        ))
        .unwrap();
    let broken = storage
        .insert_site(&NewSite::sitemap(
            "Broken",
            &server.uri(),
            &format!("{}/broken.xml", server.uri()),
        ))
        .unwrap();
    let mut crawl = NewSite::sitemap("Crawl", &server.uri(), &format!("{}/good.xml", server.uri()));
    crawl.monitoring_mode = MonitoringMode::PartialCrawl;
    let skipped = storage.insert_site(&crawl).unwrap();

    let mut config = fast_config();
    config.runner.max_concurrent_sites = 2;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(config),
        Arc::new(Mutex::new(storage)),
        Arc::new(DisabledNotifier),
    ));

    let reports = run_sites(orchestrator, vec![good, broken, skipped], CancellationToken::new()).await;

    assert_eq!(reports.len(), 3);
    match &reports[0] {
        SiteReport::Completed(outcome) => assert_eq!(outcome.new_count(), 1),
        other => panic!("expected completed report, got {:?}", other),
    }
    match &reports[1] {
        // A missing root sitemap contributes nothing but does not fail the cycle
        SiteReport::Completed(outcome) => {
            assert_eq!(outcome.status, RunStatus::Success);
            assert_eq!(outcome.failed_sitemap_count, 1);
        }
        other => panic!("expected completed report, got {:?}", other),
    }
    assert!(matches!(reports[2], SiteReport::Skipped { .. }));
}

#[tokio::test]
async fn test_webhook_delivery_end_to_end() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/fresh"]))).await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0,"msg":"success"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let config = fast_config();
    let notify = NotifyConfig {
        webhook_url: Some(format!("{}/hook", server.uri())),
        secret: Some("s3cret".to_string()),
        timeout_secs: 5,
    };
    let notifier = WebhookNotifier::new(
        &notify,
        sitemap_watch::crawler::RetryPolicy::from_config(&config.http),
    )
    .unwrap();

    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
    let site_id = storage
        .lock()
        .unwrap()
        .insert_site(&NewSite::sitemap(
            "Hooked",
            &server.uri(),
            &format!("{}/sitemap.xml", server.uri()),
        ))
        .unwrap();

    let orchestrator = Orchestrator::new(Arc::new(config), storage, Arc::new(notifier));
    let outcome = orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.notification, NotificationOutcome::Sent);

    let requests = server.received_requests().await.unwrap();
    let hook = requests
        .iter()
        .find(|r| r.url.path() == "/hook")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&hook.body).unwrap();
    assert_eq!(body["msg_type"], "text");
    assert!(body["sign"].is_string());
    assert!(body["content"]["text"]
        .as_str()
        .unwrap()
        .contains(&format!("{}/fresh", server.uri())));
}
