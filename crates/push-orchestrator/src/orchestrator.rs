//! The push pipeline: fusion, dedup, filters, build and fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use broadcaster::{Broadcaster, Error as BroadcastError};
use chrono::Utc;
use quake_core::{DisasterEvent, MapRenderer, Notification};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PushConfig;
use crate::dedup::Deduplicator;
use crate::error::OrchestratorError;
use crate::filters::{FilterChain, FilterStage};
use crate::formatting::MessageBuilder;
use crate::fusion::{DonorOutcome, FusionOutcome, FusionRendezvous};

/// What `submit` did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// At least one destination accepted the message.
    Delivered { succeeded: usize, failed: usize },
    AllDestinationsFailed,
    Duplicate,
    Filtered(FilterStage),
    /// A donor report, consumed by the fusion rendezvous and never delivered itself.
    DonorConsumed { fused: bool },
    Superseded,
    Cancelled,
    Invalid(String),
    NoDestinations,
    /// Dropped during the startup silence period.
    Silenced,
    BuildFailed(String),
}

impl SubmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered { .. })
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    delivered: AtomicU64,
    duplicates: AtomicU64,
    filtered: AtomicU64,
    fused: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub received: u64,
    pub delivered: u64,
    pub duplicates: u64,
    pub filtered: u64,
    pub fused: u64,
    pub timed_out: u64,
    pub failed: u64,
}

/// Entries removed by one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub dedup: usize,
    pub throttle: usize,
    pub fusion: usize,
}

/// What would happen to an event, without touching any state.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub invalid: Option<String>,
    pub duplicate: bool,
    pub filtered: Option<FilterStage>,
    pub message: Option<String>,
    pub would_render_map: bool,
}

impl SimulationReport {
    pub fn would_deliver(&self) -> bool {
        self.invalid.is_none() && !self.duplicate && self.filtered.is_none() && self.message.is_some()
    }
}

/// Sequences the whole delivery decision for each event.
///
/// Every stateful step (dedup store, throttle counters) only advances after
/// the event has been validated, and a duplicate never reaches the throttle.
pub struct PushOrchestrator {
    config: PushConfig,
    broadcaster: Broadcaster,
    builder: Arc<dyn MessageBuilder>,
    renderer: Option<Arc<dyn MapRenderer>>,
    fusion: FusionRendezvous,
    dedup: Deduplicator,
    filters: FilterChain,
    counters: Counters,
    started_at: Instant,
    map_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PushOrchestrator {
    pub fn new(
        config: PushConfig,
        broadcaster: Broadcaster,
        builder: Arc<dyn MessageBuilder>,
        renderer: Option<Arc<dyn MapRenderer>>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        if !broadcaster.has_destinations() {
            warn!("Push orchestrator has no destinations; nothing will be delivered");
        }

        Ok(Self {
            fusion: FusionRendezvous::new(config.fusion.clone(), config.dedup.clone()),
            dedup: Deduplicator::new(config.dedup.clone()),
            filters: FilterChain::new(&config),
            config,
            broadcaster,
            builder,
            renderer,
            counters: Counters::default(),
            started_at: Instant::now(),
            map_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    pub fn fusion(&self) -> &FusionRendezvous {
        &self.fusion
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Run an event through the pipeline and deliver it if every stage agrees.
    pub async fn submit(&self, event: DisasterEvent) -> SubmitOutcome {
        bump(&self.counters.received);

        if let Err(e) = event.validate() {
            warn!(source = %event.source, id = %event.id, "Rejecting malformed event: {}", e);
            return SubmitOutcome::Invalid(e.to_string());
        }
        if self.started_at.elapsed() < self.config.startup_silence() {
            debug!("Startup silence: dropping {} from {}", event.id, event.source);
            return SubmitOutcome::Silenced;
        }

        let event = if self.fusion.is_donor(event.source) {
            let outcome = self.fusion.offer(&event).await;
            return SubmitOutcome::DonorConsumed {
                fused: matches!(outcome, DonorOutcome::Fused { .. }),
            };
        } else if self.fusion.is_interceptable(event.source) {
            match self.fusion.intercept(event).await {
                FusionOutcome::Fused(event) => {
                    bump(&self.counters.fused);
                    event
                }
                FusionOutcome::TimedOut(event) => {
                    bump(&self.counters.timed_out);
                    event
                }
                FusionOutcome::Superseded => return SubmitOutcome::Superseded,
                FusionOutcome::Cancelled => return SubmitOutcome::Cancelled,
            }
        } else {
            event
        };

        if !self.broadcaster.has_destinations() {
            warn!("No destinations configured, dropping {}", event.id);
            return SubmitOutcome::NoDestinations;
        }

        if !self.dedup.should_push(&event).await {
            bump(&self.counters.duplicates);
            return SubmitOutcome::Duplicate;
        }

        let mut event = event;
        if let Err(stage) = self.filters.evaluate(&mut event, Utc::now()).await {
            info!("{} from {} filtered at {}", event.id, event.source, stage);
            bump(&self.counters.filtered);
            return SubmitOutcome::Filtered(stage);
        }

        let notification = match self.builder.build(&event) {
            Ok(notification) => notification,
            Err(e) => {
                error!(id = %event.id, "Failed to build message: {}", e);
                bump(&self.counters.failed);
                return SubmitOutcome::BuildFailed(e.to_string());
            }
        };

        let report = self.broadcaster.broadcast(&notification).await;
        self.schedule_map(&event).await;

        match report {
            Ok(report) if report.is_delivered() => {
                bump(&self.counters.delivered);
                info!(
                    source = %event.source,
                    event_id = %event.event_id(),
                    "Delivered report #{} to {}/{} destinations",
                    event.updates(),
                    report.succeeded(),
                    report.attempted()
                );
                SubmitOutcome::Delivered {
                    succeeded: report.succeeded(),
                    failed: report.failed.len(),
                }
            }
            Ok(_) => {
                bump(&self.counters.failed);
                error!("Every destination failed for {}", event.id);
                SubmitOutcome::AllDestinationsFailed
            }
            Err(BroadcastError::NoDestinations) => SubmitOutcome::NoDestinations,
            Err(e) => {
                bump(&self.counters.failed);
                error!("Broadcast of {} failed: {}", event.id, e);
                SubmitOutcome::AllDestinationsFailed
            }
        }
    }

    /// Report 1, every Nth report and the final report of a map-splitting feed.
    fn wants_map(&self, event: &DisasterEvent) -> bool {
        let format = &self.config.message_format;
        if !format.include_map || self.renderer.is_none() || !event.source.splits_map() {
            return false;
        }
        let Some(eq) = event.as_earthquake() else {
            return false;
        };
        if !eq.has_valid_epicenter() {
            return false;
        }
        let every = format.map_report_interval.max(1);
        eq.updates == 1 || eq.updates % every == 0 || eq.is_final
    }

    async fn schedule_map(&self, event: &DisasterEvent) {
        if !self.wants_map(event) {
            return;
        }
        let (Some(renderer), Some((html, selector))) =
            (self.renderer.clone(), self.builder.map_document(event))
        else {
            return;
        };

        let broadcaster = self.broadcaster.clone();
        let caption = format!("{} report #{} map", event.source.label(), event.updates());
        let event_id = event.event_id().to_string();

        let task = tokio::spawn(async move {
            let Some(path) = renderer.render(&html, &selector).await else {
                warn!("Map rendering failed for {}", event_id);
                return;
            };
            let notification = Notification::text(caption).with_attachment(path);
            match broadcaster.broadcast(&notification).await {
                Ok(report) => debug!("Map for {} sent to {} destinations", event_id, report.succeeded()),
                Err(e) => warn!("Map delivery for {} failed: {}", event_id, e),
            }
        });

        let mut tasks = self.map_tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Wait for every scheduled map artifact to finish.
    pub async fn flush_artifacts(&self) {
        let tasks: Vec<_> = self.map_tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Evaluate an event without delivering it or advancing any state.
    pub async fn simulate(&self, event: &DisasterEvent) -> SimulationReport {
        let mut report = SimulationReport {
            invalid: None,
            duplicate: false,
            filtered: None,
            message: None,
            would_render_map: false,
        };

        if let Err(e) = event.validate() {
            report.invalid = Some(e.to_string());
            return report;
        }
        report.duplicate = self.dedup.is_duplicate(event).await;

        match self.filters.dry_run(event, Utc::now()).await {
            Ok(annotated) => {
                report.message = self.builder.build(&annotated).ok().map(|n| n.text);
                report.would_render_map = self.wants_map(&annotated);
            }
            Err(stage) => report.filtered = Some(stage),
        }
        report
    }

    /// Purge expired dedup entries, stale throttle entries and orphaned waiters.
    pub async fn housekeeping(&self) -> PurgeReport {
        let cutoff = Utc::now() - self.config.dedup.retention();
        let report = PurgeReport {
            dedup: self.dedup.purge_expired().await,
            throttle: self.filters.purge_before(cutoff).await,
            fusion: self.fusion.purge_stale().await,
        };
        if report != PurgeReport::default() {
            info!(
                "Housekeeping removed {} dedup, {} throttle, {} fusion entries",
                report.dedup, report.throttle, report.fusion
            );
        }
        report
    }

    /// Run housekeeping on a fixed schedule until the orchestrator is dropped.
    pub fn spawn_housekeeping(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                orchestrator.housekeeping().await;
            }
        })
    }

    pub fn stats(&self) -> PushStats {
        let c = &self.counters;
        PushStats {
            received: c.received.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            filtered: c.filtered.load(Ordering::Relaxed),
            fused: c.fused.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Cancel pending fusion waits and outstanding map artifacts.
    pub async fn close(&self) {
        self.fusion.close().await;
        for task in self.map_tasks.lock().await.drain(..) {
            task.abort();
        }
        info!("Push orchestrator closed");
    }
}
