//! Mock transport implementations for testing the alert pipeline.
//!
//! This crate provides test doubles for the collaborator traits in `quake-core`:
//! - `RecordingSender` - Records every delivery, optionally failing some destinations
//! - `DelayedSender` - Wraps another sender with artificial delay
//! - `StaticRenderer` - Returns a fixed image path (or nothing) and counts calls
//!
//! # Example
//!
//! ```rust
//! use mock_transport::{MessageSender, Notification, RecordingSender};
//!
//! #[tokio::main]
//! async fn main() {
//!     let sender = RecordingSender::failing_for(["ops"]);
//!
//!     assert!(sender.send("alerts", &Notification::text("M6.0")).await.is_ok());
//!     assert!(sender.send("ops", &Notification::text("M6.0")).await.is_err());
//!     assert_eq!(sender.sent_to("alerts").await.len(), 1);
//! }
//! ```

mod delayed;
mod recording;
mod renderer;

// Re-export quake-core types for convenience
pub use quake_core::{async_trait, MapRenderer, MessageSender, Notification, SendError};

pub use delayed::DelayedSender;
pub use recording::RecordingSender;
pub use renderer::StaticRenderer;
