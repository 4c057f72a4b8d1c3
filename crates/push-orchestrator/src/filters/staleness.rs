use chrono::{DateTime, Duration, Utc};
use quake_core::DisasterEvent;
use tracing::info;

use crate::config::minutes;

/// Rejects events older than a fixed age.
///
/// Events without a timestamp and events dated in the future pass.
pub struct StalenessFilter {
    max_age: Duration,
}

impl StalenessFilter {
    pub fn new(max_age_minutes: u64) -> Self {
        Self {
            max_age: minutes(max_age_minutes),
        }
    }

    pub fn allows(&self, event: &DisasterEvent, now: DateTime<Utc>) -> bool {
        let Some(at) = event.event_time() else {
            return true;
        };
        let age = now - at;
        if age > self.max_age {
            info!("Dropping stale {} event {} ({} minutes old)", event.source, event.id, age.num_minutes());
            return false;
        }
        true
    }
}
