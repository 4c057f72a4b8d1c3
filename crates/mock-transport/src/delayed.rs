//! Delayed sender - wraps another sender with artificial delay.

use std::time::Duration;

use quake_core::{async_trait, MessageSender, Notification, SendError};
use tokio::time::sleep;

/// A sender that waits before delegating to an inner sender.
///
/// Useful for testing send timeouts and that slow destinations do not hold
/// up the others.
pub struct DelayedSender<S: MessageSender> {
    inner: S,
    delay: Duration,
}

impl<S: MessageSender> DelayedSender<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn with_millis(inner: S, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MessageSender> MessageSender for DelayedSender<S> {
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), SendError> {
        sleep(self.delay).await;
        self.inner.send(destination, notification).await
    }

    fn name(&self) -> &str {
        "DelayedSender"
    }
}
