//! Concrete delivery transports.

use async_trait::async_trait;
use quake_core::{MessageSender, Notification, SendError};
use serde::Serialize;
use tracing::{debug, info};

/// A sender that only logs notifications. Useful for dry runs.
#[derive(Debug, Clone, Default)]
pub struct LoggingSender;

#[async_trait]
impl MessageSender for LoggingSender {
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), SendError> {
        info!(
            "[{}] {} ({} attachments)",
            destination,
            notification.text,
            notification.attachments.len()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "LoggingSender"
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    destination: &'a str,
    text: &'a str,
    attachments: Vec<String>,
}

/// Posts notifications as JSON to an HTTP endpoint.
///
/// The body is `{"destination", "text", "attachments"}`; attachments are
/// sent as local paths for the receiving bridge to upload.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MessageSender for WebhookSender {
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), SendError> {
        let payload = WebhookPayload {
            destination,
            text: &notification.text,
            attachments: notification
                .attachments
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Failed(format!("webhook answered HTTP {}", status)));
        }
        debug!("Webhook accepted notification for {}", destination);
        Ok(())
    }

    fn name(&self) -> &str {
        "WebhookSender"
    }
}
