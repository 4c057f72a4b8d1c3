//! Connection supervisor for disaster alert feeds.
//!
//! This crate keeps many independently named, long-lived feed connections
//! alive. It supports:
//!
//! - Primary/backup endpoints with fixed-delay reconnection
//! - Retryable vs non-retryable error classification
//! - Heartbeat pings and an inbound message size cap
//! - Routing payloads to handler families by connection-name prefix
//! - Fixed-interval HTTP polling through the same handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feed_supervisor::{
//!     async_trait, ConnectionSpec, FeedHandler, FeedSupervisor, HandlerKind, MessageOrigin,
//!     SupervisorConfig,
//! };
//!
//! struct Print;
//!
//! #[async_trait]
//! impl FeedHandler for Print {
//!     async fn handle(&self, origin: &MessageOrigin, payload: &str) {
//!         println!("{}: {}", origin.connection, payload);
//!     }
//! }
//!
//! # async fn example() -> Result<(), feed_supervisor::FeedError> {
//! let supervisor = FeedSupervisor::new(SupervisorConfig::default());
//! supervisor.register_handler(HandlerKind::Wolfx, Arc::new(Print)).await;
//! supervisor
//!     .connect(ConnectionSpec::new("wolfx_all", "wss://ws-api.wolfx.jp/all_eew"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod poller;
pub mod supervisor;

pub use config::{ConnectionSpec, SupervisorConfig};
pub use connector::{Connector, FeedSocket, Inbound, WsConnector};
pub use error::FeedError;
pub use handler::{FeedHandler, HandlerKind, MessageOrigin, Transport};
pub use poller::PollTarget;
pub use supervisor::{ConnectionState, ConnectionStatus, FeedSupervisor};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
