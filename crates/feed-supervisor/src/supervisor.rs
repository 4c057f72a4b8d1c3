//! Per-connection lifecycle: connect, pump, classify, fail over, give up.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionSpec, SupervisorConfig};
use crate::connector::{Connector, FeedSocket, Inbound, WsConnector};
use crate::error::FeedError;
use crate::handler::{FeedHandler, HandlerKind, MessageOrigin, Transport};
use crate::poller::{run_poller, PollTarget};

/// How long `stop` waits for a task to wind down before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle state of one named connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    ReconnectScheduled,
    /// Stopped retrying after a non-retryable error.
    Failed,
    /// Stopped retrying after exhausting both endpoints.
    Abandoned,
    /// Supervisor shut down.
    Closed,
}

impl ConnectionState {
    /// Whether the connection task has finished for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Failed | ConnectionState::Abandoned | ConnectionState::Closed
        )
    }
}

/// Snapshot of one connection, safe to take at any time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub handler: HandlerKind,
    pub state: ConnectionState,
    pub connected: bool,
    pub retry_count: u32,
    pub uri: String,
    pub has_backup: bool,
    pub established_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    fn new(name: &str, handler: HandlerKind, uri: &str, has_backup: bool) -> Self {
        Self {
            name: name.to_string(),
            handler,
            state: ConnectionState::Disconnected,
            connected: false,
            retry_count: 0,
            uri: uri.to_string(),
            has_backup,
            established_at: None,
            last_error: None,
        }
    }
}

/// State shared between the supervisor and its connection tasks.
pub(crate) struct Shared {
    pub(crate) config: SupervisorConfig,
    connector: Arc<dyn Connector>,
    handlers: RwLock<HashMap<HandlerKind, Arc<dyn FeedHandler>>>,
    statuses: RwLock<HashMap<String, ConnectionStatus>>,
}

impl Shared {
    pub(crate) async fn update<F>(&self, name: &str, f: F)
    where
        F: FnOnce(&mut ConnectionStatus),
    {
        if let Some(status) = self.statuses.write().await.get_mut(name) {
            f(status);
        }
    }

    /// Hand a payload to the handler registered for the origin's kind.
    ///
    /// Unrouted payloads are dropped; handler panics are contained here.
    pub(crate) async fn dispatch(&self, origin: &MessageOrigin, payload: &str) {
        let handler = self.handlers.read().await.get(&origin.kind).cloned();
        let Some(handler) = handler else {
            warn!(
                connection = %origin.connection,
                "No handler registered for {}, dropping message",
                origin.kind
            );
            return;
        };

        let result = AssertUnwindSafe(handler.handle(origin, payload))
            .catch_unwind()
            .await;
        if result.is_err() {
            error!(connection = %origin.connection, "Feed handler panicked; message dropped");
        }
    }
}

/// Keeps named feed connections alive and routes their payloads.
pub struct FeedSupervisor {
    shared: Arc<Shared>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
    http: reqwest::Client,
}

impl FeedSupervisor {
    /// Create a supervisor using real WebSocket connections.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Create a supervisor with a custom connector.
    pub fn with_connector(config: SupervisorConfig, connector: Arc<dyn Connector>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                handlers: RwLock::new(HashMap::new()),
                statuses: RwLock::new(HashMap::new()),
            }),
            tasks: Mutex::new(HashMap::new()),
            shutdown,
            stopped: AtomicBool::new(false),
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    /// Register the handler for a family. Takes effect for live connections too.
    pub async fn register_handler(&self, kind: HandlerKind, handler: Arc<dyn FeedHandler>) {
        self.shared.handlers.write().await.insert(kind, handler);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn resolve_kind(name: &str, explicit: Option<HandlerKind>) -> Result<HandlerKind, FeedError> {
        match (HandlerKind::resolve(name), explicit) {
            (Some(derived), Some(kind)) if derived != kind => Err(FeedError::Config(format!(
                "connection {} routes to {} but {} was requested",
                name, derived, kind
            ))),
            (_, Some(kind)) => Ok(kind),
            (Some(derived), None) => Ok(derived),
            (None, None) => Err(FeedError::Config(format!(
                "no handler family matches connection name {}",
                name
            ))),
        }
    }

    /// Start supervising a connection.
    ///
    /// Idempotent while the connection's task is alive. A connection that
    /// ended as failed or abandoned is restarted with a fresh retry count.
    pub async fn connect(&self, spec: ConnectionSpec) -> Result<(), FeedError> {
        if self.is_stopped() {
            return Err(FeedError::Stopped);
        }
        let kind = Self::resolve_kind(&spec.name, spec.handler)?;
        for uri in std::iter::once(&spec.primary_uri).chain(spec.backup_uri.iter()) {
            if !(uri.starts_with("ws://") || uri.starts_with("wss://")) {
                return Err(FeedError::Config(format!("not a WebSocket URI: {}", uri)));
            }
        }

        let mut tasks = self.tasks.lock().await;
        if self.is_stopped() {
            return Err(FeedError::Stopped);
        }
        if tasks.get(&spec.name).is_some_and(|h| !h.is_finished()) {
            debug!("Connection {} already supervised", spec.name);
            return Ok(());
        }

        self.shared.statuses.write().await.insert(
            spec.name.clone(),
            ConnectionStatus::new(&spec.name, kind, &spec.primary_uri, spec.backup_uri.is_some()),
        );

        info!(
            "Supervising {} ({}) at {}{}",
            spec.name,
            kind,
            spec.primary_uri,
            spec.backup_uri
                .as_deref()
                .map(|b| format!(", backup {}", b))
                .unwrap_or_default()
        );

        let name = spec.name.clone();
        let handle = tokio::spawn(run_connection(
            self.shared.clone(),
            spec,
            kind,
            self.shutdown.subscribe(),
        ));
        tasks.insert(name, handle);
        Ok(())
    }

    /// Start a fixed-interval HTTP poll whose bodies are routed like socket messages.
    pub async fn poll(&self, target: PollTarget) -> Result<(), FeedError> {
        if self.is_stopped() {
            return Err(FeedError::Stopped);
        }
        let kind = Self::resolve_kind(&target.name, target.handler)?;
        if !(target.url.starts_with("http://") || target.url.starts_with("https://")) {
            return Err(FeedError::Config(format!("not an HTTP URL: {}", target.url)));
        }
        if target.interval.is_zero() {
            return Err(FeedError::Config("poll interval must be positive".to_string()));
        }

        let mut tasks = self.tasks.lock().await;
        if self.is_stopped() {
            return Err(FeedError::Stopped);
        }
        if tasks.get(&target.name).is_some_and(|h| !h.is_finished()) {
            debug!("Poll target {} already running", target.name);
            return Ok(());
        }

        self.shared.statuses.write().await.insert(
            target.name.clone(),
            ConnectionStatus::new(&target.name, kind, &target.url, false),
        );

        info!("Polling {} every {:?}", target.url, target.interval);
        let name = target.name.clone();
        let handle = tokio::spawn(run_poller(
            self.shared.clone(),
            self.http.clone(),
            target,
            kind,
            self.shutdown.subscribe(),
        ));
        tasks.insert(name, handle);
        Ok(())
    }

    /// Current status of one connection.
    pub async fn get_status(&self, name: &str) -> Option<ConnectionStatus> {
        self.shared.statuses.read().await.get(name).cloned()
    }

    /// Status of every known connection, sorted by name.
    pub async fn all_statuses(&self) -> Vec<ConnectionStatus> {
        let mut all: Vec<ConnectionStatus> =
            self.shared.statuses.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Cancel reconnect timers, close live sockets and refuse further work.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping feed supervisor");
        let _ = self.shutdown.send(true);

        let handles: Vec<(String, JoinHandle<()>)> = self.tasks.lock().await.drain().collect();
        for (name, mut handle) in handles {
            if timeout(STOP_GRACE, &mut handle).await.is_err() {
                warn!("Connection {} did not stop in time, aborting", name);
                handle.abort();
            }
        }

        for status in self.shared.statuses.write().await.values_mut() {
            status.state = ConnectionState::Closed;
            status.connected = false;
        }
    }
}

/// Why the read loop of an established socket ended.
enum PumpExit {
    Shutdown,
    Failed(FeedError),
}

enum Step {
    Shutdown,
    Heartbeat,
    Read(Result<Result<Option<Inbound>, FeedError>, tokio::time::error::Elapsed>),
}

async fn pump(
    shared: &Shared,
    origin: &MessageOrigin,
    socket: &mut dyn FeedSocket,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    let config = &shared.config;
    let idle = config.idle_timeout();
    let mut heartbeat = interval_at(Instant::now() + config.heartbeat_interval, config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        let step = tokio::select! {
            biased;
            _ = shutdown.changed() => Step::Shutdown,
            _ = heartbeat.tick() => Step::Heartbeat,
            read = timeout_at(last_activity + idle, socket.next_message()) => Step::Read(read),
        };

        match step {
            Step::Shutdown => return PumpExit::Shutdown,
            Step::Heartbeat => {
                if let Err(e) = socket.ping().await {
                    return PumpExit::Failed(e);
                }
                debug!("Sent heartbeat ping on {}", origin.connection);
            }
            Step::Read(Err(_)) => return PumpExit::Failed(FeedError::Timeout(idle)),
            Step::Read(Ok(Err(e))) => return PumpExit::Failed(e),
            Step::Read(Ok(Ok(None))) => return PumpExit::Failed(FeedError::Closed),
            Step::Read(Ok(Ok(Some(frame)))) => {
                last_activity = Instant::now();
                match frame {
                    Inbound::Text(text) => shared.dispatch(origin, &text).await,
                    Inbound::Binary(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => shared.dispatch(origin, &text).await,
                        Err(_) => warn!("Dropping non UTF-8 binary frame on {}", origin.connection),
                    },
                    Inbound::Control => {}
                }
            }
        }
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    spec: ConnectionSpec,
    kind: HandlerKind,
    mut shutdown: watch::Receiver<bool>,
) {
    let config = shared.config.clone();
    let name = spec.name.clone();
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let uri = spec.endpoint_for(&config, failures).to_string();
        shared
            .update(&name, |s| {
                s.state = ConnectionState::Connecting;
                s.connected = false;
                s.uri = uri.clone();
            })
            .await;
        debug!("Connecting {} to {} (attempt after {} failures)", name, uri, failures);

        let attempt = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = shared.connector.connect(&uri, &config) => result,
        };

        let err = match attempt {
            Ok(mut socket) => {
                failures = 0;
                shared
                    .update(&name, |s| {
                        s.state = ConnectionState::Connected;
                        s.connected = true;
                        s.retry_count = 0;
                        s.established_at = Some(Utc::now());
                        s.last_error = None;
                    })
                    .await;
                info!("Connected {} to {}", name, uri);

                let origin = MessageOrigin {
                    connection: name.clone(),
                    kind,
                    uri: uri.clone(),
                    transport: Transport::WebSocket,
                };
                let exit = pump(&shared, &origin, socket.as_mut(), &mut shutdown).await;
                socket.close().await;
                match exit {
                    PumpExit::Shutdown => break,
                    PumpExit::Failed(e) => e,
                }
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            error!("Connection {} failed permanently: {}", name, err);
            shared
                .update(&name, |s| {
                    s.state = ConnectionState::Failed;
                    s.connected = false;
                    s.last_error = Some(err.to_string());
                })
                .await;
            return;
        }

        failures += 1;
        let message = err.to_string();
        if failures >= config.abandon_after() {
            error!(
                "Connection {} abandoned after {} failed attempts: {}",
                name, failures, message
            );
            shared
                .update(&name, |s| {
                    s.state = ConnectionState::Abandoned;
                    s.connected = false;
                    s.retry_count = failures;
                    s.last_error = Some(message);
                })
                .await;
            return;
        }

        warn!(
            "Connection {} lost ({}); retry {}/{} in {:?}",
            name,
            message,
            failures,
            config.abandon_after(),
            config.reconnect_delay
        );
        shared
            .update(&name, |s| {
                s.state = ConnectionState::ReconnectScheduled;
                s.connected = false;
                s.retry_count = failures;
                s.last_error = Some(message);
            })
            .await;

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    shared
        .update(&name, |s| {
            s.state = ConnectionState::Closed;
            s.connected = false;
        })
        .await;
    debug!("Connection task for {} exited", name);
}
