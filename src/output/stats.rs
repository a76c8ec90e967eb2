//! Statistics gathered from storage and from multi-site runs
//!
//! This module provides functionality for extracting per-site statistics
//! from the storage layer and tallying the reports of a run.

use crate::crawler::SiteReport;
use crate::state::RunStatus;
use crate::storage::{CrawlRun, Site, Storage, StorageResult};
use std::collections::HashMap;

/// Per-site monitoring statistics
#[derive(Debug, Clone)]
pub struct SiteStatistics {
    pub site: Site,

    /// Number of recorded pages
    pub page_count: u64,

    /// Most recent history record, if any
    pub last_run: Option<CrawlRun>,

    /// Status counts over the inspected history window
    pub runs_by_status: HashMap<RunStatus, u64>,
}

impl SiteStatistics {
    pub fn runs_with(&self, status: RunStatus) -> u64 {
        self.runs_by_status.get(&status).copied().unwrap_or(0)
    }

    /// One-line tally of the inspected history, e.g. `4 success, 1 failed`
    ///
    /// Statuses with no runs are left out; `None` when there is no history.
    pub fn history_tally(&self) -> Option<String> {
        let parts: Vec<String> = [RunStatus::Success, RunStatus::PartialSuccess, RunStatus::Failed]
            .into_iter()
            .filter_map(|status| match self.runs_with(status) {
                0 => None,
                count => Some(format!("{} {}", count, status)),
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Loads statistics for one site
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `site` - The site to describe
/// * `history_window` - How many recent history records to count
///
/// # Returns
///
/// * `Ok(SiteStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query storage
pub fn load_site_statistics(
    storage: &dyn Storage,
    site: &Site,
    history_window: usize,
) -> StorageResult<SiteStatistics> {
    let page_count = storage.count_pages(site.id)?;
    let runs = storage.recent_runs(site.id, history_window)?;

    let mut runs_by_status = HashMap::new();
    for run in &runs {
        *runs_by_status.entry(run.status).or_insert(0) += 1;
    }

    Ok(SiteStatistics {
        site: site.clone(),
        page_count,
        last_run: runs.into_iter().next(),
        runs_by_status,
    })
}

/// Tally of a multi-site run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    /// New pages across all successful cycles
    pub new_pages: usize,
}

impl RunSummary {
    /// Tallies the reports of one run
    pub fn from_reports(reports: &[SiteReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report {
                SiteReport::Completed(outcome) if outcome.is_success() => {
                    summary.succeeded += 1;
                    summary.new_pages += outcome.new_count();
                }
                SiteReport::Completed(_) => summary.failed += 1,
                SiteReport::Skipped { .. } => summary.skipped += 1,
                SiteReport::Errored { .. } => summary.errored += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.errored
    }

    /// Returns true when no site failed or errored
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}
