//! Rolling window of accepted events with spatio-temporal duplicate matching.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use quake_core::{haversine_km, DataSource, DisasterEvent, DisasterType, EarthquakeData};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DedupConfig;

/// The parts of an earthquake report the tolerance match looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct QuakeFix {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub magnitude: Option<f64>,
}

impl QuakeFix {
    /// `None` when the epicenter is the unknown sentinel.
    pub fn of(eq: &EarthquakeData, time: DateTime<Utc>) -> Option<Self> {
        eq.has_valid_epicenter().then_some(Self {
            time,
            latitude: eq.latitude,
            longitude: eq.longitude,
            magnitude: eq.magnitude,
        })
    }

    /// Time AND distance AND magnitude all within tolerance.
    ///
    /// A magnitude missing on exactly one side fails the magnitude check.
    pub fn matches(&self, other: &QuakeFix, config: &DedupConfig) -> bool {
        let within_time = (self.time - other.time).abs() <= config.window();
        if !within_time {
            return false;
        }
        let distance = haversine_km(self.latitude, self.longitude, other.latitude, other.longitude);
        if distance > config.location_tolerance_km {
            return false;
        }
        match (self.magnitude, other.magnitude) {
            (Some(a), Some(b)) => (a - b).abs() <= config.magnitude_tolerance + f64::EPSILON,
            (None, None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct SeenEvent {
    source: DataSource,
    disaster_type: DisasterType,
    id: String,
    event_id: String,
    updates: u32,
    fix: Option<QuakeFix>,
    recorded_at: DateTime<Utc>,
}

impl SeenEvent {
    fn from_event(event: &DisasterEvent, now: DateTime<Utc>) -> Self {
        let time = event.event_time().unwrap_or(now);
        Self {
            source: event.source,
            disaster_type: event.disaster_type,
            id: event.id.clone(),
            event_id: event.event_id().to_string(),
            updates: event.updates(),
            fix: event.as_earthquake().and_then(|eq| QuakeFix::of(eq, time)),
            recorded_at: now,
        }
    }

    fn key(&self) -> String {
        format!("{}|{}|{}|{}", self.source, self.id, self.event_id, self.updates)
    }

    fn same_lineage(&self, other: &SeenEvent) -> bool {
        self.source == other.source && !self.event_id.is_empty() && self.event_id == other.event_id
    }
}

/// Keeps recently accepted events and rejects near-identical reports.
///
/// Expired entries are only removed by [`Deduplicator::purge_expired`],
/// which callers run on a schedule.
pub struct Deduplicator {
    config: DedupConfig,
    seen: Mutex<IndexMap<String, SeenEvent>>,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            seen: Mutex::new(IndexMap::new()),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    fn find_duplicate<'a>(
        &self,
        seen: &'a IndexMap<String, SeenEvent>,
        candidate: &SeenEvent,
    ) -> Option<&'a SeenEvent> {
        // A later report in a lineage this window already accepted is a
        // refinement, not a duplicate of anything.
        let refines_own_lineage = seen
            .values()
            .any(|s| s.same_lineage(candidate) && candidate.updates > s.updates);
        if refines_own_lineage {
            return None;
        }

        seen.values().find(|stored| {
            if stored.same_lineage(candidate) && stored.updates == candidate.updates {
                return true;
            }
            if stored.disaster_type.is_earthquake() != candidate.disaster_type.is_earthquake() {
                return false;
            }
            match (&stored.fix, &candidate.fix) {
                (Some(a), Some(b)) => a.matches(b, &self.config),
                _ => {
                    stored.disaster_type == candidate.disaster_type
                        && stored.id == candidate.id
                        && stored.updates == candidate.updates
                }
            }
        })
    }

    /// Whether the event duplicates something in the window. Read-only.
    pub async fn is_duplicate(&self, event: &DisasterEvent) -> bool {
        let candidate = SeenEvent::from_event(event, Utc::now());
        let seen = self.seen.lock().await;
        self.find_duplicate(&seen, &candidate).is_some()
    }

    /// Accept and record the event, or reject it as a duplicate.
    ///
    /// Nothing is recorded on rejection.
    pub async fn should_push(&self, event: &DisasterEvent) -> bool {
        let candidate = SeenEvent::from_event(event, Utc::now());
        let mut seen = self.seen.lock().await;

        if let Some(original) = self.find_duplicate(&seen, &candidate) {
            info!(
                "Duplicate of {} report #{} from {}: {} report #{}",
                original.event_id, original.updates, original.source, candidate.source, candidate.updates
            );
            return false;
        }

        debug!("Recording {} report #{} from {}", candidate.event_id, candidate.updates, candidate.source);
        seen.insert(candidate.key(), candidate);
        true
    }

    /// Drop entries older than the retention period. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_before(Utc::now() - self.config.retention()).await
    }

    pub(crate) async fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut seen = self.seen.lock().await;
        let before = seen.len();
        seen.retain(|_, entry| entry.recorded_at >= cutoff);
        let removed = before - seen.len();
        if removed > 0 {
            debug!("Purged {} expired dedup entries", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }
}
