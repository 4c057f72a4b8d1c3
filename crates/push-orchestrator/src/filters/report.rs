use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use quake_core::{DataSource, DisasterEvent};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::ReportControlConfig;

#[derive(Debug, Clone)]
pub(crate) struct ThrottleEntry {
    last_updates: u32,
    touched_at: DateTime<Utc>,
}

pub(crate) type ThrottleState = IndexMap<(DataSource, String), ThrottleEntry>;

/// Passes only every Nth refinement of an early-warning event.
///
/// Report #1 always passes, and so does the final report when
/// `final_report_always_push` is set. The first report seen for an event
/// passes whatever its number, so joining a sequence late still alerts.
pub struct ReportThrottle {
    control: ReportControlConfig,
    seen: Mutex<ThrottleState>,
}

impl ReportThrottle {
    pub fn new(control: ReportControlConfig) -> Self {
        Self {
            control,
            seen: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        self.seen.lock().await
    }

    pub(crate) fn admits(&self, seen: &ThrottleState, event: &DisasterEvent) -> bool {
        let Some(family) = event.source.report_family() else {
            return true;
        };
        let updates = event.updates();
        if updates <= 1 {
            return true;
        }
        if event.is_final() && self.control.final_report_always_push {
            return true;
        }

        let n = self.control.interval_for(family);
        if self.control.ignore_non_final_reports && n <= 1 {
            return false;
        }
        if !seen.contains_key(&(event.source, event.event_id().to_string())) {
            return true;
        }
        updates % n == 0
    }

    pub(crate) fn commit(&self, seen: &mut ThrottleState, event: &DisasterEvent, now: DateTime<Utc>) {
        if event.source.report_family().is_none() {
            return;
        }
        seen.insert(
            (event.source, event.event_id().to_string()),
            ThrottleEntry {
                last_updates: event.updates(),
                touched_at: now,
            },
        );
    }

    /// Highest report number delivered for an event, if any.
    pub async fn last_delivered(&self, source: DataSource, event_id: &str) -> Option<u32> {
        let seen = self.seen.lock().await;
        seen.get(&(source, event_id.to_string())).map(|e| e.last_updates)
    }

    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut seen = self.seen.lock().await;
        let before = seen.len();
        seen.retain(|_, entry| entry.touched_at >= cutoff);
        let removed = before - seen.len();
        if removed > 0 {
            debug!("Purged {} throttle entries", removed);
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
