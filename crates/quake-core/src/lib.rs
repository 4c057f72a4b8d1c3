//! Core types and collaborator traits for the disaster alert pipeline.
//!
//! This crate provides the shared vocabulary used by every other crate in
//! the workspace:
//!
//! - [`DisasterEvent`] - The canonical event envelope produced by feed parsers
//! - [`DataSource`] - The closed catalogue of known feeds and their policies
//! - [`EventParser`] / [`MessageSender`] / [`MapRenderer`] - Seams to the
//!   external parsing, delivery and rendering collaborators
//! - [`haversine_km`] and [`estimate_intensity`] - Geodesy helpers
//!
//! # Example
//!
//! ```rust
//! use quake_core::{CanonicalJsonParser, EventParser};
//!
//! let raw = r#"{
//!     "id": "cenc-1",
//!     "source": "cenc_fanstudio",
//!     "disaster_type": "EARTHQUAKE",
//!     "source_id": "cenc_fanstudio",
//!     "data": {
//!         "kind": "earthquake",
//!         "id": "cenc-1",
//!         "event_id": "cenc-1",
//!         "magnitude": 5.2,
//!         "latitude": 30.1,
//!         "longitude": 103.0,
//!         "place_name": "Sichuan"
//!     }
//! }"#;
//!
//! let event = CanonicalJsonParser.parse(raw).unwrap().unwrap();
//! assert_eq!(event.event_id(), "cenc-1");
//! ```

mod error;
mod event;
mod geo;
mod intensity;
mod source;
mod time;
mod transport;

pub use error::{EventError, SendError};
pub use event::{
    DisasterEvent, DisasterType, EarthquakeData, EventPayload, LocalEstimate, TsunamiData,
    WeatherAlarmData,
};
pub use geo::{haversine_km, is_valid_epicenter, EARTH_RADIUS_KM};
pub use intensity::{estimate_intensity, DEFAULT_DEPTH_KM, MAX_INTENSITY};
pub use source::{DataSource, FilterClass, ReportFamily};
pub use time::{naive_offset_seconds, EventTime};
pub use transport::{CanonicalJsonParser, EventParser, MapRenderer, MessageSender, Notification};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
