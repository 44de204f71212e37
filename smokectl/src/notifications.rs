//! Failure notifications.
//!
//! A [`Notifier`] receives a plain-text summary when a run has failing probes. Delivery is
//! fire-and-forget: [`WebhookNotifier`] hands the message to a detached task and returns
//! immediately, and the run never learns whether delivery succeeded.

use serde_json::json;
use url::Url;

use crate::config::NotificationsConfig;

/// Sink for run failure summaries.
pub trait Notifier: Send + Sync {
    /// Deliver `message`, best-effort. Must not block and must not fail the caller.
    fn notify(&self, message: String);
}

/// Posts `{"text": <message>}` to an incoming-webhook URL (Slack and compatible services).
///
/// Without a configured URL every notification is a silent no-op.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<Url>,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
        })
    }

    /// A notifier that never delivers anything.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: String) {
        let Some(url) = self.webhook_url.clone() else {
            tracing::debug!("No webhook configured, dropping failure notification");
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            deliver(client, url, message).await;
        });
    }
}

async fn deliver(client: reqwest::Client, url: Url, message: String) {
    let host = url.host_str().unwrap_or_default().to_string();

    match client.post(url).json(&json!({ "text": message })).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(host = %host, status = response.status().as_u16(), "Failure notification delivered");
        }
        Ok(response) => {
            tracing::warn!(host = %host, status = response.status().as_u16(), "Failure notification rejected");
        }
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "Failed to deliver failure notification");
        }
    }
}
