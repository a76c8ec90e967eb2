//! Notifier trait and error types

use crate::crawler::SitemapEntry;
use crate::notify::message;
use crate::storage::Site;
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

/// Errors that can occur while delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifications are not configured")]
    NotConfigured,

    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    Status(u16),

    #[error("Webhook rejected the message (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Failed to sign message: {0}")]
    Signing(String),
}

impl NotifyError {
    /// Returns true if resending the same message may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status(status) => *status >= 500 || *status == 429,
            Self::NotConfigured | Self::Rejected { .. } | Self::Signing(_) => false,
        }
    }
}

/// Delivers human-readable messages about monitoring results
///
/// Delivery failures are returned to the caller, which decides whether they
/// matter. A failed notification never undoes committed state.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns false when messages would never be delivered
    fn is_enabled(&self) -> bool;

    /// Sends a plain text message
    async fn send_text(&self, text: &str) -> Result<(), NotifyError>;

    /// Announces pages discovered for `site`
    ///
    /// Does nothing when `pages` is empty.
    async fn notify_new_pages(&self, site: &Site, pages: &[SitemapEntry]) -> Result<(), NotifyError> {
        if pages.is_empty() {
            return Ok(());
        }
        let text = message::new_pages(site, pages, Utc::now());
        self.send_text(&text).await
    }

    /// Reports a failed monitoring cycle for `site`
    async fn notify_error(&self, site: &Site, error: &str) -> Result<(), NotifyError> {
        let text = message::error(site, error, Utc::now());
        self.send_text(&text).await
    }
}

/// Notifier used when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn send_text(&self, _text: &str) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}
