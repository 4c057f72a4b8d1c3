//! Error types for push orchestration.

use thiserror::Error;

/// Errors that can occur while configuring or running the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// Configuration cannot be honored.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The message builder could not render an event.
    #[error("message build failed: {0}")]
    Build(String),
}
