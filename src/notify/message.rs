//! Notification message text

use crate::crawler::SitemapEntry;
use crate::storage::Site;
use chrono::{DateTime, Utc};

/// Pages listed individually in a new-pages message
pub const MAX_INLINE_PAGES: usize = 10;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Builds the new-pages announcement
///
/// The first `MAX_INLINE_PAGES` URLs are listed and the remainder is
/// summarized by count.
pub fn new_pages(site: &Site, pages: &[SitemapEntry], at: DateTime<Utc>) -> String {
    let mut text = format!(
        "⚡ New pages discovered\n\n\
         🔍 Site: {}\n\
         🌐 URL: {}\n\
         ⏰ Found at: {}\n\
         📊 New pages: {}\n\n\
         📋 Pages:\n",
        site.name,
        site.base_url,
        at.format(TIME_FORMAT),
        pages.len()
    );

    for (i, page) in pages.iter().take(MAX_INLINE_PAGES).enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, page.url));
    }

    if pages.len() > MAX_INLINE_PAGES {
        text.push_str(&format!(
            "\n...and {} more",
            pages.len() - MAX_INLINE_PAGES
        ));
    }

    text
}

/// Builds the failed-cycle message
pub fn error(site: &Site, error: &str, at: DateTime<Utc>) -> String {
    format!(
        "❌ Monitoring failed\n\n\
         🔍 Site: {}\n\
         🌐 URL: {}\n\
         ⏰ Time: {}\n\n\
         📝 Error:\n{}",
        site.name,
        site.base_url,
        at.format(TIME_FORMAT),
        error
    )
}

/// Builds the message sent by `test-notify`
pub fn test(at: DateTime<Utc>) -> String {
    format!(
        "🔔 Notification test\n\n\
         This is a test message to check that notifications are delivered.\n\
         ⏰ Sent at: {}",
        at.format(TIME_FORMAT)
    )
}

/// Outcome of a scheduled workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Success,
    Failure,
}

/// CI run details included in workflow reports
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    pub workflow: Option<String>,
    pub repository: Option<String>,
    pub run_id: Option<String>,
    pub server_url: Option<String>,
}

impl WorkflowContext {
    /// Reads the context from GitHub Actions environment variables
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            workflow: var("GITHUB_WORKFLOW"),
            repository: var("GITHUB_REPOSITORY"),
            run_id: var("GITHUB_RUN_ID"),
            server_url: var("GITHUB_SERVER_URL"),
        }
    }

    /// Link to the run page, when the repository and run are known
    pub fn run_url(&self) -> Option<String> {
        let repository = self.repository.as_deref()?;
        let run_id = self.run_id.as_deref()?;
        let server = self.server_url.as_deref().unwrap_or("https://github.com");
        Some(format!(
            "{}/{}/actions/runs/{}",
            server.trim_end_matches('/'),
            repository,
            run_id
        ))
    }
}

/// Builds a workflow success or failure report
pub fn workflow_report(
    outcome: WorkflowOutcome,
    context: &WorkflowContext,
    at: DateTime<Utc>,
) -> String {
    let unknown = "unknown";
    let headline = match outcome {
        WorkflowOutcome::Success => "✅ Run succeeded",
        WorkflowOutcome::Failure => "❌ Run failed",
    };

    let mut text = format!(
        "{}\n\n\
         📊 Workflow: {}\n\
         🏢 Repository: {}\n\
         🔄 Run ID: {}\n\
         ⏰ Time: {}",
        headline,
        context.workflow.as_deref().unwrap_or(unknown),
        context.repository.as_deref().unwrap_or(unknown),
        context.run_id.as_deref().unwrap_or(unknown),
        at.format(TIME_FORMAT)
    );

    if outcome == WorkflowOutcome::Failure {
        if let Some(url) = context.run_url() {
            text.push_str(&format!("\n\n🔍 Details: {}", url));
        }
    }

    text
}
