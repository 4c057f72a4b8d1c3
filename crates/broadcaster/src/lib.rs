//! Broadcast utilities for disaster notifications.
//!
//! This crate delivers one notification to every configured destination,
//! independently: a failing destination never prevents delivery to the
//! others.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use broadcaster::{Broadcaster, LoggingSender};
//! use quake_core::Notification;
//!
//! # async fn example() -> Result<(), broadcaster::Error> {
//! let broadcaster = Broadcaster::new(
//!     Arc::new(LoggingSender),
//!     vec!["ops-channel".to_string(), "public-feed".to_string()],
//! );
//!
//! let report = broadcaster.broadcast(&Notification::text("M6.0 Off Miyagi")).await?;
//! println!("delivered to {} of {}", report.succeeded(), report.attempted());
//! # Ok(())
//! # }
//! ```

mod sender;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use quake_core::{MessageSender, Notification, SendError};
use thiserror::Error;
use tracing::{info, warn};

pub use sender::{LoggingSender, WebhookSender};

/// Default per-destination send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during broadcast operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No destinations are configured.
    #[error("no destinations configured")]
    NoDestinations,

    /// Transport error for a single send.
    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

/// Outcome of one broadcast across all destinations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BroadcastReport {
    pub fn succeeded(&self) -> usize {
        self.delivered.len()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    /// At least one destination accepted the notification.
    pub fn is_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// A broadcaster that fans a notification out to a fixed destination list.
#[derive(Clone)]
pub struct Broadcaster {
    sender: Arc<dyn MessageSender>,
    destinations: Vec<String>,
    send_timeout: Duration,
}

impl Broadcaster {
    /// Create a broadcaster over a sender and destination list.
    pub fn new(sender: Arc<dyn MessageSender>, destinations: Vec<String>) -> Self {
        Self {
            sender,
            destinations,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set the per-destination timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    pub fn has_destinations(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Send to a single destination.
    pub async fn send_to(&self, destination: &str, notification: &Notification) -> Result<(), Error> {
        match tokio::time::timeout(self.send_timeout, self.sender.send(destination, notification)).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Send(SendError::Timeout)),
        }
    }

    /// Send to every destination concurrently and collect per-destination results.
    pub async fn broadcast(&self, notification: &Notification) -> Result<BroadcastReport, Error> {
        if self.destinations.is_empty() {
            return Err(Error::NoDestinations);
        }

        let sends = self.destinations.iter().map(|destination| async move {
            (destination, self.send_to(destination, notification).await)
        });

        let mut report = BroadcastReport::default();
        for (destination, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered.push(destination.clone()),
                Err(e) => {
                    warn!(destination = %destination, "Delivery via {} failed: {}", self.sender.name(), e);
                    report.failed.push((destination.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Broadcast delivered to {}/{} destinations",
            report.succeeded(),
            report.attempted()
        );
        Ok(report)
    }
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
