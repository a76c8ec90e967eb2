//! End-to-end monitoring cycles that succeed

use crate::common::{fast_config, pages, serve, sitemap_index, urlset, Harness};
use flate2::write::GzEncoder;
use flate2::Compression;
use sitemap_watch::config::UrlIdentity;
use sitemap_watch::crawler::NotificationOutcome;
use sitemap_watch::storage::{NewSite, Storage};
use sitemap_watch::RunStatus;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn site_for(server: &MockServer, sitemap_path: &str) -> NewSite {
    NewSite::sitemap(
        "Example",
        &server.uri(),
        &format!("{}{}", server.uri(), sitemap_path),
    )
}

#[tokio::test]
async fn test_first_run_records_every_page() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a", "/b"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.new_count(), 2);
    assert_eq!(outcome.reseen_count, 0);
    assert_eq!(harness.count_pages(site_id), 2);

    let runs = harness.runs(site_id);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].pages_found_count, 2);

    let site = harness.storage.lock().unwrap().get_site(site_id).unwrap().unwrap();
    assert!(site.last_crawled_at.is_some());
}

#[tokio::test]
async fn test_second_run_finds_only_the_new_page() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a", "/b"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));
    let cancel = CancellationToken::new();

    harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();

    server.reset().await;
    serve(
        &server,
        "/sitemap.xml",
        urlset(&pages(&server, &["/a", "/b", "/c"])),
    )
    .await;

    let outcome = harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    let new_urls: Vec<&str> = outcome.new_pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(new_urls, vec![format!("{}/c", server.uri())]);
    assert_eq!(outcome.reseen_count, 2);
    assert_eq!(harness.count_pages(site_id), 3);

    let runs = harness.runs(site_id);
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].pages_found_count, 1);

    // One message per run with new pages
    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].contains(&format!("{}/c", server.uri())));
}

#[tokio::test]
async fn test_unchanged_sitemap_is_idempotent() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a", "/b"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));
    let cancel = CancellationToken::new();

    harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();
    let outcome = harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();

    assert_eq!(outcome.new_count(), 0);
    assert_eq!(outcome.reseen_count, 2);
    assert_eq!(outcome.notification, NotificationOutcome::NotNeeded);
    assert_eq!(harness.count_pages(site_id), 2);
}

#[tokio::test]
async fn test_index_of_two_leaves() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/sitemap_index.xml",
        sitemap_index(&pages(&server, &["/posts.xml", "/pages.xml"])),
    )
    .await;
    serve(&server, "/posts.xml", urlset(&pages(&server, &["/p1", "/p2"]))).await;
    serve(&server, "/pages.xml", urlset(&pages(&server, &["/about"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap_index.xml"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.sitemap_count, 3);
    assert_eq!(outcome.new_count(), 3);
    assert_eq!(outcome.failed_sitemap_count, 0);
}

#[tokio::test]
async fn test_self_referencing_index_terminates() {
    let server = MockServer::start().await;
    let index_url = format!("{}/sitemap_index.xml", server.uri());

    Mock::given(method("GET"))
        .and(path("/sitemap_index.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_index(&[
            index_url.clone(),
            format!("{}/leaf.xml", server.uri()),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/leaf.xml", urlset(&pages(&server, &["/only"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap_index.xml"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.sitemap_count, 2);
    assert_eq!(outcome.new_count(), 1);
}

#[tokio::test]
async fn test_gzipped_sitemap() {
    let server = MockServer::start().await;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(urlset(&pages(&server, &["/g1", "/g2"])).as_bytes())
        .unwrap();
    let compressed = encoder.finish().unwrap();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed))
        .mount(&server)
        .await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml.gz"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.new_count(), 2);
    assert_eq!(outcome.failed_sitemap_count, 0);
}

#[tokio::test]
async fn test_corrupt_gzip_contributes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not gzip".to_vec()))
        .mount(&server)
        .await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml.gz"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.new_count(), 0);
    assert_eq!(outcome.failed_sitemap_count, 1);
    assert_eq!(harness.count_pages(site_id), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.new_count(), 1);
}

#[tokio::test]
async fn test_retry_ceiling_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));

    let outcome = harness
        .orchestrator
        .run_cycle(site_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.new_count(), 0);
    assert_eq!(outcome.failed_sitemap_count, 1);
}

#[tokio::test]
async fn test_normalized_identity_matches_variants() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a/"]))).await;

    let mut config = fast_config();
    config.diff.url_identity = UrlIdentity::Normalized;
    let harness = Harness::new(config);
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));
    let cancel = CancellationToken::new();

    harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();

    server.reset().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a#top"]))).await;

    let outcome = harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();
    assert_eq!(outcome.new_count(), 0);
    assert_eq!(outcome.reseen_count, 1);
    assert_eq!(harness.count_pages(site_id), 1);
}

#[tokio::test]
async fn test_exact_identity_treats_variants_as_new() {
    let server = MockServer::start().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a/"]))).await;

    let harness = Harness::new(fast_config());
    let site_id = harness.add_site(site_for(&server, "/sitemap.xml"));
    let cancel = CancellationToken::new();

    harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();

    server.reset().await;
    serve(&server, "/sitemap.xml", urlset(&pages(&server, &["/a"]))).await;

    let outcome = harness.orchestrator.run_cycle(site_id, &cancel).await.unwrap();
    assert_eq!(outcome.new_count(), 1);
    assert_eq!(harness.count_pages(site_id), 2);
}
