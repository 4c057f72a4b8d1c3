//! The explicitly owned service instance with a start/stop lifecycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broadcaster::{Broadcaster, LoggingSender, WebhookSender};
use chrono::{DateTime, Utc};
use feed_supervisor::{
    ConnectionSpec, ConnectionStatus, FeedHandler, FeedSupervisor, HandlerKind, MessageOrigin,
    PollTarget,
};
use push_orchestrator::{PlainTextBuilder, PushOrchestrator, PushStats, SubmitOutcome};
use quake_core::{CanonicalJsonParser, DisasterEvent, EventParser, MapRenderer, MessageSender};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::ServiceError;

pub const FAN_STUDIO_PRIMARY: &str = "wss://ws.fanstudio.tech/all";
pub const FAN_STUDIO_BACKUP: &str = "wss://ws.fanstudio.hk/all";
pub const P2P_QUAKE: &str = "wss://api.p2pquake.net/v2/ws";
pub const WOLFX_ALL_EEW: &str = "wss://ws-api.wolfx.jp/all_eew";
pub const GLOBAL_QUAKE: &str = "wss://gqm.aloys233.top/ws";
pub const WOLFX_CENC_LIST: &str = "https://api.wolfx.jp/cenc_eqlist.json";
pub const WOLFX_JMA_LIST: &str = "https://api.wolfx.jp/jma_eqlist.json";

/// Parses raw feed payloads and submits the events to the pipeline.
pub struct FeedBridge {
    parser: Arc<dyn EventParser>,
    orchestrator: Arc<PushOrchestrator>,
}

impl FeedBridge {
    pub fn new(parser: Arc<dyn EventParser>, orchestrator: Arc<PushOrchestrator>) -> Self {
        Self { parser, orchestrator }
    }

    async fn submit(orchestrator: &PushOrchestrator, event: DisasterEvent) {
        let id = event.id.clone();
        let source = event.source;
        match orchestrator.submit(event).await {
            SubmitOutcome::Delivered { succeeded, failed } => {
                info!("Pushed {} from {} ({} ok, {} failed)", id, source, succeeded, failed)
            }
            outcome => debug!("{} from {} not pushed: {:?}", id, source, outcome),
        }
    }
}

#[async_trait]
impl FeedHandler for FeedBridge {
    async fn handle(&self, origin: &MessageOrigin, payload: &str) {
        let event = match self.parser.parse(payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("[{}] ignoring non-event payload", origin.connection);
                return;
            }
            Err(e) => {
                warn!("[{}] dropping undecodable payload: {}", origin.connection, e);
                return;
            }
        };

        // A fusion wait would stall the connection's reader, so it runs detached.
        if self.orchestrator.fusion().is_interceptable(event.source) {
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move { Self::submit(&orchestrator, event).await });
            return;
        }
        Self::submit(&self.orchestrator, event).await;
    }
}

/// Service health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime: String,
    pub active_connections: usize,
    pub connections: Vec<ConnectionStatus>,
    pub stats: PushStats,
}

/// Human-readable uptime such as `1d 2h 5m 9s`.
pub fn format_uptime(elapsed: chrono::Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, rest) = (rest / 3_600, rest % 3_600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", seconds));
    parts.join(" ")
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    started_at: Option<DateTime<Utc>>,
    housekeeping: Option<JoinHandle<()>>,
}

/// Owns the supervisor and the push pipeline for one process.
pub struct DisasterService {
    config: ServiceConfig,
    supervisor: FeedSupervisor,
    orchestrator: Arc<PushOrchestrator>,
    parser: Arc<dyn EventParser>,
    lifecycle: Mutex<Lifecycle>,
}

impl DisasterService {
    /// Build a service with real sockets and the canonical JSON parser.
    pub fn new(
        config: ServiceConfig,
        sender: Arc<dyn MessageSender>,
        renderer: Option<Arc<dyn MapRenderer>>,
    ) -> Result<Self, ServiceError> {
        let supervisor = FeedSupervisor::new(config.websocket.to_supervisor_config());
        Self::with_parts(config, supervisor, sender, renderer, Arc::new(CanonicalJsonParser))
    }

    /// Build a service from explicit parts.
    pub fn with_parts(
        config: ServiceConfig,
        supervisor: FeedSupervisor,
        sender: Arc<dyn MessageSender>,
        renderer: Option<Arc<dyn MapRenderer>>,
        parser: Arc<dyn EventParser>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let broadcaster =
            Broadcaster::new(sender, config.targets.clone()).with_send_timeout(config.send_timeout());
        let builder = Arc::new(PlainTextBuilder::new(config.push.message_format.display_utc_offset_hours));
        let orchestrator = Arc::new(PushOrchestrator::new(
            config.push.clone(),
            broadcaster,
            builder,
            renderer,
        )?);

        Ok(Self {
            config,
            supervisor,
            orchestrator,
            parser,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// The default sender: a webhook when configured, logging otherwise.
    pub fn default_sender(config: &ServiceConfig) -> Arc<dyn MessageSender> {
        match &config.webhook_url {
            Some(url) => Arc::new(WebhookSender::new(url.clone())),
            None => Arc::new(LoggingSender),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<PushOrchestrator> {
        &self.orchestrator
    }

    pub fn supervisor(&self) -> &FeedSupervisor {
        &self.supervisor
    }

    /// Socket connections for the enabled data sources.
    pub fn connection_specs(&self) -> Vec<ConnectionSpec> {
        let sources = &self.config.data_sources;
        let mut specs = Vec::new();
        if sources.fan_studio.enabled {
            specs.push(ConnectionSpec::new("fan_studio_all", FAN_STUDIO_PRIMARY).with_backup(FAN_STUDIO_BACKUP));
        }
        if sources.p2p_earthquake.enabled {
            specs.push(ConnectionSpec::new("p2p_main", P2P_QUAKE));
        }
        if sources.wolfx.enabled {
            specs.push(ConnectionSpec::new("wolfx_all", WOLFX_ALL_EEW));
        }
        if sources.global_quake.enabled {
            specs.push(ConnectionSpec::new("global_quake", GLOBAL_QUAKE));
        }
        specs
    }

    /// HTTP list endpoints, when polling is enabled.
    pub fn poll_targets(&self) -> Vec<PollTarget> {
        let polling = &self.config.http_polling;
        if !polling.enabled || !self.config.data_sources.wolfx.enabled {
            return Vec::new();
        }
        let every = Duration::from_secs(polling.interval_seconds);
        vec![
            PollTarget::new("wolfx_cenc_list", WOLFX_CENC_LIST, every),
            PollTarget::new("wolfx_jma_list", WOLFX_JMA_LIST, every),
        ]
    }

    /// Register handlers, open connections and start housekeeping.
    ///
    /// A second call while running does nothing.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running {
            debug!("Disaster service already running");
            return Ok(());
        }

        let bridge: Arc<dyn FeedHandler> =
            Arc::new(FeedBridge::new(self.parser.clone(), self.orchestrator.clone()));
        for kind in HandlerKind::ALL {
            self.supervisor.register_handler(kind, bridge.clone()).await;
        }

        for spec in self.connection_specs() {
            info!("Connecting {} to {}", spec.name, spec.primary_uri);
            self.supervisor.connect(spec).await?;
        }
        for target in self.poll_targets() {
            info!("Polling {} every {:?}", target.url, target.interval);
            self.supervisor.poll(target).await?;
        }

        lifecycle.housekeeping = Some(
            self.orchestrator
                .spawn_housekeeping(self.config.housekeeping_interval()),
        );
        lifecycle.running = true;
        lifecycle.started_at = Some(Utc::now());
        info!("Disaster service started");
        Ok(())
    }

    /// Stop feeds, cancel pending fusion waits and housekeeping.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.supervisor.stop().await;
        self.orchestrator.close().await;
        if let Some(task) = lifecycle.housekeeping.take() {
            task.abort();
        }
        if lifecycle.running {
            info!("Disaster service stopped");
        }
        lifecycle.running = false;
    }

    pub async fn status(&self) -> ServiceStatus {
        let (running, started_at) = {
            let lifecycle = self.lifecycle.lock().await;
            (lifecycle.running, lifecycle.started_at)
        };
        let uptime = match (running, started_at) {
            (true, Some(at)) => format_uptime(Utc::now() - at),
            _ => "not running".to_string(),
        };
        let connections = self.supervisor.all_statuses().await;

        ServiceStatus {
            running,
            started_at,
            uptime,
            active_connections: connections.iter().filter(|c| c.connected).count(),
            connections,
            stats: self.orchestrator.stats(),
        }
    }
}
