//! Run summary delivery.
//!
//! The orchestrator hands the aggregated summary to a [`Notifier`] exactly
//! once per run. Delivery failures are logged by the caller and never change
//! the run's outcome.

use async_trait::async_trait;
use serde_json::json;

use crate::error::NotifyError;
use crate::transport::HttpClient;

pub const DEFAULT_TITLE: &str = "Zepp step sync";

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short identifier used in logs (e.g. "webhook", "log").
    fn name(&self) -> &str;

    /// Deliver one message.
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Used when no delivery channel is configured: the summary only goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(%title, "{body}");
        Ok(())
    }
}

/// POSTs `{"title": ..., "content": ...}` to a webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: HttpClient,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, client: HttpClient) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        if self.url.is_empty() {
            return Err(NotifyError::NotConfigured(self.name().to_string()));
        }
        let payload = json!({ "title": title, "content": body });
        self.client
            .send_checked(|c| c.post(&self.url).json(&payload))
            .await?;
        Ok(())
    }
}
