//! Event instants that may arrive without a timezone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const HOUR: i32 = 3600;

/// UTC offset, in seconds, assigned to naive timestamps from a feed.
///
/// Japanese feeds publish JST, Global Quake publishes UTC and everything
/// else is normalized to China Standard Time upstream.
pub fn naive_offset_seconds(source_id: &str) -> i32 {
    if source_id.contains("jma") || source_id.contains("p2p") {
        9 * HOUR
    } else if source_id.contains("global_quake") {
        0
    } else {
        8 * HOUR
    }
}

/// A timestamp as published by a feed, with or without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl EventTime {
    /// Resolve to an absolute instant, interpreting naive values at `offset_seconds`.
    pub fn resolve(&self, offset_seconds: i32) -> DateTime<Utc> {
        match self {
            EventTime::Zoned(dt) => dt.with_timezone(&Utc),
            EventTime::Naive(naive) => {
                (*naive - Duration::seconds(i64::from(offset_seconds))).and_utc()
            }
        }
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(dt: DateTime<Utc>) -> Self {
        EventTime::Zoned(dt.fixed_offset())
    }
}
