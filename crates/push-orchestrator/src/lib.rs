//! Delivery policy for disaster events.
//!
//! The [`PushOrchestrator`] decides whether and how often an event reaches
//! subscribers:
//!
//! - [`FusionRendezvous`] - lets a donor feed enrich a faster feed's report
//! - [`Deduplicator`] - drops near-identical reports from redundant feeds
//! - [`FilterChain`] - staleness, keyword, threshold, throttle and local-site stages
//! - [`MessageBuilder`] - renders the outgoing message
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use broadcaster::{Broadcaster, LoggingSender};
//! use push_orchestrator::{PlainTextBuilder, PushConfig, PushOrchestrator};
//! use quake_core::{DataSource, DisasterEvent, DisasterType, EarthquakeData};
//!
//! #[tokio::main]
//! async fn main() {
//!     let broadcaster = Broadcaster::new(Arc::new(LoggingSender), vec!["ops".to_string()]);
//!     let orchestrator = PushOrchestrator::new(
//!         PushConfig::default(),
//!         broadcaster,
//!         Arc::new(PlainTextBuilder::default()),
//!         None,
//!     )
//!     .unwrap();
//!
//!     let mut eq = EarthquakeData::new("usgs-1", 35.0, 135.0);
//!     eq.magnitude = Some(6.0);
//!     let event = DisasterEvent::earthquake(DataSource::UsgsFanstudio, DisasterType::Earthquake, eq);
//!
//!     assert!(orchestrator.submit(event).await.is_delivered());
//! }
//! ```

pub mod config;
mod dedup;
mod error;
pub mod filters;
mod formatting;
mod fusion;
mod orchestrator;

pub use config::{
    DedupConfig, FilterConfig, FusionPolicy, LocalSiteConfig, MessageFormatConfig, PushConfig,
    ReportControlConfig,
};
pub use dedup::Deduplicator;
pub use error::OrchestratorError;
pub use filters::{FilterChain, FilterStage, WarningLevel};
pub use formatting::{MessageBuilder, PlainTextBuilder, MAP_SELECTOR};
pub use fusion::{DonorOutcome, FusionOutcome, FusionRendezvous};
pub use orchestrator::{PurgeReport, PushOrchestrator, PushStats, SimulationReport, SubmitOutcome};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
