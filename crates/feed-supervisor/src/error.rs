//! Error types for feed-supervisor.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Errors produced while connecting to or reading from a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Handshake, read or request did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// Socket-level failure (reset, refused, broken pipe, eof).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// WebSocket protocol violation or oversized message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Outbound buffer is full.
    #[error("write buffer full")]
    Backpressure,

    /// Handshake answered with an unexpected HTTP status.
    #[error("handshake rejected with HTTP {0}")]
    Handshake(u16),

    /// HTTP polling request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Credentials were rejected (HTTP 401/403).
    #[error("authentication rejected with HTTP {0}")]
    Auth(u16),

    /// TLS or certificate failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid connection configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The supervisor has been stopped.
    #[error("supervisor stopped")]
    Stopped,
}

impl FeedError {
    /// Whether the failure should trigger a reconnect.
    ///
    /// Credential and certificate problems will not fix themselves, so they
    /// stop the connection instead.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FeedError::Auth(_) | FeedError::Tls(_) | FeedError::Config(_) | FeedError::Stopped
        )
    }
}

fn looks_like_tls(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["certificate", "ssl", "tls"].iter().any(|k| lower.contains(k))
}

fn auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

impl From<WsError> for FeedError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => FeedError::Closed,
            WsError::Io(e) if looks_like_tls(&e.to_string()) => FeedError::Tls(e.to_string()),
            WsError::Io(e) => FeedError::Io(e),
            WsError::Tls(e) => FeedError::Tls(e.to_string()),
            WsError::Capacity(e) => FeedError::Protocol(e.to_string()),
            WsError::WriteBufferFull(_) => FeedError::Backpressure,
            WsError::Url(e) => FeedError::Config(e.to_string()),
            WsError::HttpFormat(e) => FeedError::Config(e.to_string()),
            WsError::Http(response) => {
                let status = response.status().as_u16();
                if auth_status(status) {
                    FeedError::Auth(status)
                } else {
                    FeedError::Handshake(status)
                }
            }
            #[allow(unreachable_patterns)]
            other => FeedError::Protocol(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FeedError::Http(format!("request timed out: {}", err));
        }
        match err.status().map(|s| s.as_u16()) {
            Some(status) if auth_status(status) => FeedError::Auth(status),
            _ => FeedError::Http(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FeedError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(FeedError::Closed.is_retryable());
        assert!(FeedError::Backpressure.is_retryable());
        assert!(FeedError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_retryable());
        assert!(FeedError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)).is_retryable());
        assert!(FeedError::Handshake(502).is_retryable());

        assert!(!FeedError::Auth(401).is_retryable());
        assert!(!FeedError::Tls("bad certificate".to_string()).is_retryable());
        assert!(!FeedError::Config("bad url".to_string()).is_retryable());
    }

    #[test]
    fn test_ws_errors_map() {
        assert!(matches!(FeedError::from(WsError::ConnectionClosed), FeedError::Closed));
        let io = io::Error::new(io::ErrorKind::InvalidData, "invalid peer certificate: Expired");
        assert!(matches!(FeedError::from(WsError::Io(io)), FeedError::Tls(_)));
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(FeedError::from(WsError::Io(reset)).is_retryable());
    }
}
