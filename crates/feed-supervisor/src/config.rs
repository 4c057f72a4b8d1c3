//! Configuration types for feed-supervisor.

use std::time::Duration;

use crate::handler::HandlerKind;

/// Default interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Default handshake and HTTP request timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default inbound message cap (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;
/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Settings shared by every supervised connection.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval between heartbeat pings on an established socket.
    pub heartbeat_interval: Duration,
    /// Handshake timeout, also added to the heartbeat interval to form the
    /// read-idle timeout.
    pub connection_timeout: Duration,
    /// Consecutive failures tolerated on one endpoint before switching.
    /// A connection is abandoned after twice this many.
    pub max_reconnect_retries: u32,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Fixed delay before every reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_reconnect_retries: 3,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl SupervisorConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_reconnect_retries = retries;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Read-idle timeout for an established socket.
    pub fn idle_timeout(&self) -> Duration {
        self.heartbeat_interval + self.connection_timeout
    }

    /// Total failed attempts after which a connection is abandoned.
    pub fn abandon_after(&self) -> u32 {
        self.max_reconnect_retries.max(1).saturating_mul(2)
    }

    /// Whether the attempt following `failures` consecutive failures should
    /// target the backup endpoint.
    pub fn use_backup(&self, failures: u32) -> bool {
        (failures / self.max_reconnect_retries.max(1)) % 2 == 1
    }
}

/// One named connection with its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSpec {
    pub name: String,
    pub primary_uri: String,
    pub backup_uri: Option<String>,
    /// Explicit handler; when absent it is derived from the name prefix.
    pub handler: Option<HandlerKind>,
}

impl ConnectionSpec {
    /// Create a spec with only a primary endpoint.
    pub fn new(name: impl Into<String>, primary_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_uri: primary_uri.into(),
            backup_uri: None,
            handler: None,
        }
    }

    pub fn with_backup(mut self, backup_uri: impl Into<String>) -> Self {
        self.backup_uri = Some(backup_uri.into());
        self
    }

    pub fn with_handler(mut self, handler: HandlerKind) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Endpoint for the attempt following `failures` consecutive failures.
    pub fn endpoint_for(&self, config: &SupervisorConfig, failures: u32) -> &str {
        match &self.backup_uri {
            Some(backup) if config.use_backup(failures) => backup,
            _ => &self.primary_uri,
        }
    }
}
