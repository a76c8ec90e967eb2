//! Multi-site scheduling
//!
//! This module handles:
//! - Running one monitoring cycle per site as a tokio task
//! - Global concurrency limiting via a semaphore
//! - Holding a site's slot for the politeness delay after its cycle
//! - Stopping new cycles once cancellation is requested

use crate::crawler::orchestrator::{CycleOutcome, Orchestrator};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What happened to one site during a multi-site run
#[derive(Debug, Clone)]
pub enum SiteReport {
    /// The cycle ran; check the outcome status for success
    Completed(CycleOutcome),

    /// The site was not monitored (unsupported mode, missing sitemap URL,
    /// disabled, or the run was cancelled before it started)
    Skipped { site_id: i64, reason: String },

    /// The cycle could not start for an operational reason
    Errored { site_id: i64, error: String },
}

impl SiteReport {
    pub fn site_id(&self) -> i64 {
        match self {
            Self::Completed(outcome) => outcome.site_id,
            Self::Skipped { site_id, .. } | Self::Errored { site_id, .. } => *site_id,
        }
    }

    /// Returns true for errored sites and completed cycles that failed
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Completed(outcome) => !outcome.is_success(),
            Self::Skipped { .. } => false,
            Self::Errored { .. } => true,
        }
    }
}

/// Runs one cycle for each site in `site_ids`
///
/// At most `runner.max-concurrent-sites` cycles run at once. After each
/// cycle the site keeps its slot for `runner.site-delay-ms` so consecutive
/// sites are spaced out. Once `cancel` fires no new cycle starts and
/// in-flight cycles abort their fetches.
///
/// # Arguments
///
/// * `orchestrator` - Shared orchestrator
/// * `site_ids` - Sites to run, in order
/// * `cancel` - Cancellation for the whole run
///
/// # Returns
///
/// One report per requested site, in the order given
pub async fn run_sites(
    orchestrator: Arc<Orchestrator>,
    site_ids: Vec<i64>,
    cancel: CancellationToken,
) -> Vec<SiteReport> {
    let runner = &orchestrator.config().runner;
    let semaphore = Arc::new(Semaphore::new(runner.max_concurrent_sites.max(1) as usize));
    let site_delay = runner.site_delay();

    let mut reports: Vec<Option<SiteReport>> = vec![None; site_ids.len()];
    let mut tasks = JoinSet::new();

    for (index, &site_id) in site_ids.iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let report = run_one(&orchestrator, site_id, &cancel).await;

            if !site_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(site_delay) => {}
                }
            }

            drop(permit);
            (index, report)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, report)) => reports[index] = Some(report),
            Err(e) => tracing::error!(error = %e, "Site task failed"),
        }
    }

    let cancelled = cancel.is_cancelled();
    site_ids
        .into_iter()
        .zip(reports)
        .map(|(site_id, report)| {
            report.unwrap_or_else(|| {
                if cancelled {
                    SiteReport::Skipped {
                        site_id,
                        reason: "run cancelled before the site started".to_string(),
                    }
                } else {
                    SiteReport::Errored {
                        site_id,
                        error: "site task aborted".to_string(),
                    }
                }
            })
        })
        .collect()
}

async fn run_one(orchestrator: &Orchestrator, site_id: i64, cancel: &CancellationToken) -> SiteReport {
    match orchestrator.run_cycle(site_id, cancel).await {
        Ok(outcome) => SiteReport::Completed(outcome),
        Err(e) if e.is_site_config() => {
            tracing::warn!(site_id, reason = %e, "Skipping site");
            SiteReport::Skipped {
                site_id,
                reason: e.to_string(),
            }
        }
        Err(e) => {
            tracing::error!(site_id, error = %e, "Site cycle could not start");
            SiteReport::Errored {
                site_id,
                error: e.to_string(),
            }
        }
    }
}
