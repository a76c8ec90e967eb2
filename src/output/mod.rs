//! Output module for printing monitoring results
//!
//! This module handles:
//! - Printing the outcome of a single cycle
//! - Printing the tally of a multi-site run
//! - Listing monitored sites and their crawl history

pub mod stats;

pub use stats::{load_site_statistics, RunSummary, SiteStatistics};

use crate::crawler::{CycleOutcome, NotificationOutcome, SiteReport};
use crate::notify::MAX_INLINE_PAGES;
use crate::storage::{CrawlRun, Site};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Prints the outcome of one cycle
pub fn print_cycle_outcome(outcome: &CycleOutcome) {
    let marker = if outcome.is_success() { "✓" } else { "✗" };
    println!(
        "{} [{}] {} ({}): {}",
        marker, outcome.site_id, outcome.site_name, outcome.status, outcome.message
    );

    for page in outcome.new_pages.iter().take(MAX_INLINE_PAGES) {
        println!("    + {}", page.url);
    }
    if outcome.new_count() > MAX_INLINE_PAGES {
        println!("    ... and {} more", outcome.new_count() - MAX_INLINE_PAGES);
    }

    match &outcome.notification {
        NotificationOutcome::Failed(reason) => println!("    ! notification failed: {}", reason),
        NotificationOutcome::Sent => println!("    notification sent"),
        NotificationOutcome::NotNeeded | NotificationOutcome::Disabled => {}
    }

    if !outcome.history_recorded {
        println!("    ! crawl history could not be recorded");
    }
}

/// Prints every report of a multi-site run followed by the tally
pub fn print_run_reports(reports: &[SiteReport]) {
    for report in reports {
        match report {
            SiteReport::Completed(outcome) => print_cycle_outcome(outcome),
            SiteReport::Skipped { site_id, reason } => {
                println!("- [{}] skipped: {}", site_id, reason)
            }
            SiteReport::Errored { site_id, error } => println!("✗ [{}] error: {}", site_id, error),
        }
    }

    let summary = RunSummary::from_reports(reports);
    println!();
    println!("=== Run Summary ===");
    println!("  Sites: {}", summary.total());
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Failed: {}", summary.failed);
    println!("  Skipped: {}", summary.skipped);
    if summary.errored > 0 {
        println!("  Errored: {}", summary.errored);
    }
    println!("  New pages: {}", summary.new_pages);
}

/// Prints one line per site
pub fn print_site_list(sites: &[SiteStatistics]) {
    if sites.is_empty() {
        println!("No sites registered");
        return;
    }

    println!("=== Monitored Sites ===\n");
    for stats in sites {
        let site = &stats.site;
        let state = if site.enabled { "enabled" } else { "disabled" };
        let last_crawled = site
            .last_crawled_at
            .map(|at| at.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "never".to_string());

        println!("[{}] {} ({}, {})", site.id, site.name, site.monitoring_mode, state);
        println!("    Sitemap: {}", site.sitemap_url().unwrap_or("-"));
        println!("    Pages recorded: {}", stats.page_count);
        println!("    Last crawled: {}", last_crawled);
        if let Some(run) = &stats.last_run {
            println!("    Last run: {} ({} new)", run.status, run.pages_found_count);
        }
        if let Some(tally) = stats.history_tally() {
            println!("    Recent runs: {}", tally);
        }
    }
}

/// Prints recent crawl history for a site, newest first
pub fn print_history(site: &Site, runs: &[CrawlRun]) {
    println!("=== Crawl History: {} ===\n", site.name);

    if runs.is_empty() {
        println!("No crawl history recorded");
        return;
    }

    for run in runs {
        let seconds = (run.finished_at - run.started_at).num_seconds();
        println!(
            "#{} {} {} {:>4} new {:>4}s{}",
            run.id,
            run.started_at.format(TIME_FORMAT),
            run.status,
            run.pages_found_count,
            seconds,
            run.run_identifier
                .as_deref()
                .map(|id| format!(" run={}", id))
                .unwrap_or_default()
        );
        if let Some(message) = &run.message {
            println!("    {}", message);
        }
    }
}
