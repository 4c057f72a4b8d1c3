//! Error types shared across the pipeline.

use thiserror::Error;

/// Reasons a canonical event is rejected before it touches shared state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    /// The envelope has no message id.
    #[error("event has an empty id")]
    MissingId,

    /// The payload kind does not match the declared disaster type.
    #[error("payload kind {payload} does not match disaster type {declared}")]
    KindMismatch { declared: String, payload: String },

    /// Report sequence numbers are 1-based.
    #[error("report number must be at least 1, got {0}")]
    InvalidReportNumber(u32),

    /// A coordinate is outside its valid range.
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    CoordinateOutOfRange { lat: f64, lon: f64 },

    /// A numeric field is NaN or infinite.
    #[error("field {0} is not a finite number")]
    NonFinite(&'static str),

    /// The raw payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Decode(err.to_string())
    }
}

/// Errors reported by delivery and rendering transports.
#[derive(Debug, Error)]
pub enum SendError {
    /// The destination is unknown to the transport.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    /// The transport rejected or failed to deliver the message.
    #[error("delivery failed: {0}")]
    Failed(String),

    /// The transport did not answer in time.
    #[error("delivery timed out")]
    Timeout,
}
