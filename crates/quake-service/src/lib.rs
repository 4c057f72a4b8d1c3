//! Disaster alert service.
//!
//! Wires the feed supervisor to the push pipeline and the broadcaster:
//!
//! - [`ServiceConfig`] - JSON file plus `QUAKE_*` environment overrides
//! - [`FeedBridge`] - parses feed payloads and submits events
//! - [`DisasterService`] - explicit start/stop lifecycle and status
//!
//! # Example
//!
//! ```rust,no_run
//! use quake_service::{DisasterService, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quake_service::ServiceError> {
//!     let config = ServiceConfig::from_env()?;
//!     let sender = DisasterService::default_sender(&config);
//!     let service = DisasterService::new(config, sender, None)?;
//!
//!     service.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     service.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;
mod service;

pub use config::{DataSourceSettings, FeedToggle, HttpPollSettings, ServiceConfig, WebSocketSettings};
pub use error::ServiceError;
pub use service::{format_uptime, DisasterService, FeedBridge, ServiceStatus};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
