//! Recording sender - keeps every delivery for later assertions.

use std::collections::HashSet;

use quake_core::{async_trait, MessageSender, Notification, SendError};
use tokio::sync::Mutex;

/// A sender that records deliveries and fails for configured destinations.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, Notification)>>,
    failing: HashSet<String>,
}

impl RecordingSender {
    /// Create a sender that accepts every destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sender that fails for the given destinations.
    pub fn failing_for<I, S>(destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: destinations.into_iter().map(Into::into).collect(),
        }
    }

    /// All successful deliveries in order.
    pub async fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().await.clone()
    }

    /// Notifications delivered to one destination.
    pub async fn sent_to(&self, destination: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Number of successful deliveries.
    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), SendError> {
        if self.failing.contains(destination) {
            return Err(SendError::Failed(format!("{} is configured to fail", destination)));
        }
        self.sent
            .lock()
            .await
            .push((destination.to_string(), notification.clone()));
        Ok(())
    }

    fn name(&self) -> &str {
        "RecordingSender"
    }
}
