//! Service configuration loaded from a JSON file and environment variables.

use std::env;
use std::path::Path;
use std::time::Duration;

use feed_supervisor::SupervisorConfig;
use push_orchestrator::PushConfig;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Socket settings shared by every feed connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketSettings {
    pub heartbeat_interval_seconds: u64,
    pub connection_timeout_seconds: u64,
    pub max_reconnect_retries: u32,
    pub max_message_size: usize,
    pub reconnect_delay_seconds: u64,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: 60,
            connection_timeout_seconds: 10,
            max_reconnect_retries: 3,
            max_message_size: 1024 * 1024,
            reconnect_delay_seconds: 5,
        }
    }
}

impl WebSocketSettings {
    pub fn to_supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_seconds),
            connection_timeout: Duration::from_secs(self.connection_timeout_seconds),
            max_reconnect_retries: self.max_reconnect_retries,
            max_message_size: self.max_message_size,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedToggle {
    pub enabled: bool,
}

impl FeedToggle {
    fn on() -> Self {
        Self { enabled: true }
    }

    fn off() -> Self {
        Self { enabled: false }
    }
}

impl Default for FeedToggle {
    fn default() -> Self {
        Self::on()
    }
}

/// Which upstream networks to connect to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceSettings {
    pub fan_studio: FeedToggle,
    pub p2p_earthquake: FeedToggle,
    pub wolfx: FeedToggle,
    pub global_quake: FeedToggle,
}

impl Default for DataSourceSettings {
    fn default() -> Self {
        Self {
            fan_studio: FeedToggle::on(),
            p2p_earthquake: FeedToggle::on(),
            wolfx: FeedToggle::on(),
            global_quake: FeedToggle::off(),
        }
    }
}

/// Periodic fetch of the Wolfx earthquake list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPollSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for HttpPollSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 300,
        }
    }
}

/// Everything the service needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Delivery destinations handed to the sender.
    pub targets: Vec<String>,
    /// Webhook the default sender posts to. Notifications are only logged when unset.
    pub webhook_url: Option<String>,
    pub send_timeout_seconds: u64,
    pub websocket: WebSocketSettings,
    pub data_sources: DataSourceSettings,
    pub http_polling: HttpPollSettings,
    pub housekeeping_interval_seconds: u64,
    pub push: PushConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            webhook_url: None,
            send_timeout_seconds: 30,
            websocket: WebSocketSettings::default(),
            data_sources: DataSourceSettings::default(),
            http_polling: HttpPollSettings::default(),
            housekeeping_interval_seconds: 300,
            push: PushConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `QUAKE_CONFIG` | Path to a JSON config file | (built-in defaults) |
    /// | `QUAKE_TARGETS` | Comma-separated destinations | from file |
    /// | `QUAKE_WEBHOOK_URL` | Webhook for deliveries | from file |
    /// | `QUAKE_LOCAL_LAT` / `QUAKE_LOCAL_LON` | Enables the local site estimate | from file |
    pub fn from_env() -> Result<Self, ServiceError> {
        let mut config = match env::var("QUAKE_CONFIG") {
            Ok(path) => Self::from_path(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `QUAKE_*` overrides from any variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(targets) = lookup("QUAKE_TARGETS") {
            self.targets = targets
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(url) = lookup("QUAKE_WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            self.webhook_url = Some(url);
        }

        let coordinate = |key: &str| -> Result<Option<f64>, ServiceError> {
            lookup(key)
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .map_err(|_| ServiceError::Config(format!("{} is not a number: {}", key, v)))
                })
                .transpose()
        };
        match (coordinate("QUAKE_LOCAL_LAT")?, coordinate("QUAKE_LOCAL_LON")?) {
            (Some(lat), Some(lon)) => {
                let site = &mut self.push.local_monitor;
                site.enabled = true;
                site.latitude = lat;
                site.longitude = lon;
            }
            (None, None) => {}
            _ => {
                return Err(ServiceError::Config(
                    "QUAKE_LOCAL_LAT and QUAKE_LOCAL_LON must be set together".to_string(),
                ))
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.push.validate()?;
        if self.websocket.max_message_size == 0 {
            return Err(ServiceError::Config("websocket.max_message_size must be positive".to_string()));
        }
        if self.http_polling.enabled && self.http_polling.interval_seconds == 0 {
            return Err(ServiceError::Config("http_polling.interval_seconds must be positive".to_string()));
        }
        Ok(())
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_seconds.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds.max(1))
    }
}
