//! Canonical disaster event records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::geo::is_valid_epicenter;
use crate::source::DataSource;
use crate::time::{naive_offset_seconds, EventTime};

/// What kind of occurrence an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisasterType {
    Earthquake,
    EarthquakeWarning,
    Tsunami,
    Weather,
}

impl DisasterType {
    pub fn is_earthquake(&self) -> bool {
        matches!(self, DisasterType::Earthquake | DisasterType::EarthquakeWarning)
    }
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisasterType::Earthquake => "earthquake",
            DisasterType::EarthquakeWarning => "earthquake_warning",
            DisasterType::Tsunami => "tsunami",
            DisasterType::Weather => "weather",
        };
        f.write_str(s)
    }
}

fn first_report() -> u32 {
    1
}

/// Local-site annotation written by the local estimate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEstimate {
    pub place_name: String,
    pub distance_km: f64,
    pub intensity: f64,
    /// Whether the estimate cleared the configured local threshold.
    pub allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeData {
    pub id: String,
    /// Groups successive reports of one physical event.
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub magnitude: Option<f64>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub shock_time: Option<EventTime>,
    #[serde(default)]
    pub place_name: String,
    #[serde(default)]
    pub intensity: Option<f64>,
    /// Regional scale (e.g. JMA shindo) where the feed reports one.
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default = "first_report")]
    pub updates: u32,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub local_estimate: Option<LocalEstimate>,
}

impl EarthquakeData {
    /// Create a first report with the given id and epicenter.
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        let id = id.into();
        Self {
            event_id: id.clone(),
            id,
            magnitude: None,
            latitude,
            longitude,
            depth: None,
            shock_time: None,
            place_name: String::new(),
            intensity: None,
            scale: None,
            updates: 1,
            is_final: false,
            local_estimate: None,
        }
    }

    pub fn has_valid_epicenter(&self) -> bool {
        is_valid_epicenter(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsunamiData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub org_unit: String,
    #[serde(default)]
    pub areas: Vec<String>,
    #[serde(default)]
    pub issue_time: Option<EventTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlarmData {
    pub id: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub alarm_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub issue_time: Option<EventTime>,
    #[serde(default)]
    pub effective_time: Option<EventTime>,
}

impl WeatherAlarmData {
    /// Headline text, falling back to the title.
    pub fn display_headline(&self) -> &str {
        if self.headline.is_empty() {
            &self.title
        } else {
            &self.headline
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Earthquake(EarthquakeData),
    Tsunami(TsunamiData),
    Weather(WeatherAlarmData),
}

impl EventPayload {
    fn kind(&self) -> &'static str {
        match self {
            EventPayload::Earthquake(_) => "earthquake",
            EventPayload::Tsunami(_) => "tsunami",
            EventPayload::Weather(_) => "weather",
        }
    }
}

/// The envelope every feed parser produces.
///
/// Identity is `id` (one per message); `event_id` on earthquake payloads
/// groups successive reports of one occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterEvent {
    pub id: String,
    pub source: DataSource,
    pub disaster_type: DisasterType,
    pub data: EventPayload,
    #[serde(default)]
    pub source_id: String,
}

impl DisasterEvent {
    pub fn earthquake(source: DataSource, disaster_type: DisasterType, data: EarthquakeData) -> Self {
        Self {
            id: data.id.clone(),
            source,
            disaster_type,
            source_id: source.id().to_string(),
            data: EventPayload::Earthquake(data),
        }
    }

    pub fn tsunami(source: DataSource, data: TsunamiData) -> Self {
        Self {
            id: data.id.clone(),
            source,
            disaster_type: DisasterType::Tsunami,
            source_id: source.id().to_string(),
            data: EventPayload::Tsunami(data),
        }
    }

    pub fn weather(source: DataSource, data: WeatherAlarmData) -> Self {
        Self {
            id: data.id.clone(),
            source,
            disaster_type: DisasterType::Weather,
            source_id: source.id().to_string(),
            data: EventPayload::Weather(data),
        }
    }

    pub fn as_earthquake(&self) -> Option<&EarthquakeData> {
        match &self.data {
            EventPayload::Earthquake(eq) => Some(eq),
            _ => None,
        }
    }

    pub fn as_earthquake_mut(&mut self) -> Option<&mut EarthquakeData> {
        match &mut self.data {
            EventPayload::Earthquake(eq) => Some(eq),
            _ => None,
        }
    }

    /// Effective source id, preferring the explicit field.
    pub fn source_key(&self) -> &str {
        if self.source_id.is_empty() {
            self.source.id()
        } else {
            &self.source_id
        }
    }

    /// Report grouping key: the earthquake `event_id`, or the message id.
    pub fn event_id(&self) -> &str {
        match &self.data {
            EventPayload::Earthquake(eq) if !eq.event_id.is_empty() => &eq.event_id,
            _ => &self.id,
        }
    }

    pub fn updates(&self) -> u32 {
        self.as_earthquake().map_or(1, |eq| eq.updates)
    }

    pub fn is_final(&self) -> bool {
        self.as_earthquake().is_some_and(|eq| eq.is_final)
    }

    /// Absolute instant of the occurrence, with naive values resolved by source.
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        let raw = match &self.data {
            EventPayload::Earthquake(eq) => eq.shock_time,
            EventPayload::Tsunami(t) => t.issue_time,
            EventPayload::Weather(w) => w.effective_time.or(w.issue_time),
        }?;
        Some(raw.resolve(naive_offset_seconds(self.source_key())))
    }

    /// Check the structural invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.id.trim().is_empty() {
            return Err(EventError::MissingId);
        }

        let consistent = matches!(
            (&self.data, self.disaster_type),
            (EventPayload::Earthquake(_), DisasterType::Earthquake | DisasterType::EarthquakeWarning)
                | (EventPayload::Tsunami(_), DisasterType::Tsunami)
                | (EventPayload::Weather(_), DisasterType::Weather)
        );
        if !consistent {
            return Err(EventError::KindMismatch {
                declared: self.disaster_type.to_string(),
                payload: self.data.kind().to_string(),
            });
        }

        if let EventPayload::Earthquake(eq) = &self.data {
            if eq.updates == 0 {
                return Err(EventError::InvalidReportNumber(eq.updates));
            }
            if !eq.latitude.is_finite() || !eq.longitude.is_finite() {
                return Err(EventError::NonFinite("coordinates"));
            }
            if !(-90.0..=90.0).contains(&eq.latitude) || !(-180.0..=180.0).contains(&eq.longitude) {
                return Err(EventError::CoordinateOutOfRange {
                    lat: eq.latitude,
                    lon: eq.longitude,
                });
            }
            let numeric = [
                ("magnitude", eq.magnitude),
                ("depth", eq.depth),
                ("intensity", eq.intensity),
                ("scale", eq.scale),
            ];
            for (name, value) in numeric {
                if value.is_some_and(|v| !v.is_finite()) {
                    return Err(EventError::NonFinite(name));
                }
            }
        }

        Ok(())
    }
}
