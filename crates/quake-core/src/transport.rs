//! Seams to the external parsing, delivery and rendering collaborators.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{EventError, SendError};
use crate::event::DisasterEvent;

/// An outgoing notification: text plus optional attachment paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Notification {
    pub text: String,
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Turns one raw feed payload into a canonical event.
///
/// `Ok(None)` means the payload was understood but carries no event
/// (heartbeats, acknowledgements, unsupported message types).
pub trait EventParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Option<DisasterEvent>, EventError>;
}

/// Parser for payloads that are already in the canonical JSON shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalJsonParser;

impl EventParser for CanonicalJsonParser {
    fn parse(&self, raw: &str) -> Result<Option<DisasterEvent>, EventError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.get("data").is_none() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

/// Delivers a notification to a single destination.
///
/// Abstracted to support different transports (chat bots, webhooks, tests).
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send a notification.
    ///
    /// # Arguments
    /// * `destination` - Transport-specific destination id
    /// * `notification` - Text and attachments to deliver
    async fn send(&self, destination: &str, notification: &Notification) -> Result<(), SendError>;

    /// Transport name used in logs.
    fn name(&self) -> &str {
        "sender"
    }
}

/// Renders an HTML document (or a selector inside it) to an image file.
///
/// Rendering failures are reported as `None`; they never abort delivery.
#[async_trait]
pub trait MapRenderer: Send + Sync {
    async fn render(&self, html: &str, selector: &str) -> Option<PathBuf>;
}
