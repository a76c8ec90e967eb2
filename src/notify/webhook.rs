//! Signed webhook notifier
//!
//! Messages are posted as `{"msg_type": "text", "content": {"text": ...}}`.
//! When a secret is configured the payload also carries `timestamp` and
//! `sign`, where `sign` is the base64 HMAC-SHA256 of an empty message keyed
//! with `"{timestamp}\n{secret}"`.

use crate::config::NotifyConfig;
use crate::crawler::RetryPolicy;
use crate::notify::traits::{Notifier, NotifyError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Posts text messages to a chat webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
    secret: Option<String>,
    policy: RetryPolicy,
}

impl WebhookNotifier {
    /// Creates a notifier for `config.webhook_url`
    ///
    /// # Returns
    ///
    /// * `Ok(WebhookNotifier)` - Ready to send
    /// * `Err(NotifyError::NotConfigured)` - No webhook URL is set
    /// * `Err(NotifyError::Request)` - The HTTP client could not be built
    pub fn new(config: &NotifyConfig, policy: RetryPolicy) -> Result<Self, NotifyError> {
        let url = config
            .webhook_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or(NotifyError::NotConfigured)?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            url,
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            policy,
        })
    }

    fn payload(&self, text: &str, timestamp: i64) -> Result<Value, NotifyError> {
        let mut payload = json!({
            "msg_type": "text",
            "content": { "text": text },
        });

        if let Some(secret) = &self.secret {
            payload["timestamp"] = Value::String(timestamp.to_string());
            payload["sign"] = Value::String(sign(timestamp, secret)?);
        }

        Ok(payload)
    }

    async fn post_once(&self, text: &str) -> Result<(), NotifyError> {
        let payload = self.payload(text, chrono::Utc::now().timestamp())?;
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        check_response_body(&body)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let err = match self.post_once(text).await {
                Ok(()) => {
                    tracing::info!(attempt, "Notification delivered");
                    return Ok(());
                }
                Err(err) => err,
            };

            tracing::warn!(attempt, error = %err, "Notification attempt failed");

            if !err.is_transient() || !self.policy.should_retry(attempt) {
                return Err(err);
            }

            tokio::time::sleep(self.policy.delay_for(attempt)).await;
        }
    }
}

/// Computes the webhook signature for `timestamp` (seconds since the epoch)
pub fn sign(timestamp: i64, secret: &str) -> Result<String, NotifyError> {
    let key = format!("{}\n{}", timestamp, secret);
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| NotifyError::Signing(e.to_string()))?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Interprets a 2xx response body
///
/// JSON bodies with a non-zero `code` are rejections. Other bodies are
/// accepted.
fn check_response_body(body: &str) -> Result<(), NotifyError> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Ok(());
    };

    match value.get("code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => {
            let message = value
                .get("msg")
                .or_else(|| value.get("StatusMessage"))
                .and_then(Value::as_str)
                .unwrap_or("no message")
                .to_string();
            Err(NotifyError::Rejected { code, message })
        }
    }
}
