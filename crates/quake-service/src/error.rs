//! Error types for the disaster service.

use feed_supervisor::FeedError;
use push_orchestrator::OrchestratorError;
use thiserror::Error;

/// Errors that can occur while configuring or starting the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] OrchestratorError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
}
