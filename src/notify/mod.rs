//! Notification dispatch
//!
//! - `Notifier`: the delivery interface used by the orchestrator
//! - `WebhookNotifier`: signed chat webhook delivery with retries
//! - `DisabledNotifier`: used when no webhook is configured
//! - `message`: text formatting for every message kind

pub mod message;
mod traits;
mod webhook;

pub use traits::{DisabledNotifier, Notifier, NotifyError};
pub use message::{WorkflowContext, WorkflowOutcome, MAX_INLINE_PAGES};
pub use webhook::{sign, WebhookNotifier};

use crate::config::Config;
use crate::crawler::RetryPolicy;
use std::sync::Arc;

/// Builds the notifier described by the configuration
///
/// Returns a `DisabledNotifier` when no webhook URL is configured.
pub fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, NotifyError> {
    let configured = config
        .notify
        .webhook_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty());

    if !configured {
        tracing::warn!("No webhook URL configured, notifications are disabled");
        return Ok(Arc::new(DisabledNotifier));
    }

    let policy = RetryPolicy::from_config(&config.http);
    Ok(Arc::new(WebhookNotifier::new(&config.notify, policy)?))
}
