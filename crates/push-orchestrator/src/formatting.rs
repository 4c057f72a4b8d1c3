//! Turning accepted events into outgoing notifications.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use quake_core::{DisasterEvent, EventPayload, Notification};

use crate::error::OrchestratorError;

/// Element the map renderer captures.
pub const MAP_SELECTOR: &str = "#card-wrapper";

/// Builds the primary message and, optionally, the map document for an event.
pub trait MessageBuilder: Send + Sync {
    fn build(&self, event: &DisasterEvent) -> Result<Notification, OrchestratorError>;

    /// HTML and capture selector for the map artifact.
    fn map_document(&self, _event: &DisasterEvent) -> Option<(String, String)> {
        None
    }
}

/// Compact text card with times shown at a fixed UTC offset.
#[derive(Debug, Clone)]
pub struct PlainTextBuilder {
    offset: FixedOffset,
}

impl Default for PlainTextBuilder {
    fn default() -> Self {
        Self::new(8)
    }
}

fn format_coordinates(latitude: f64, longitude: f64) -> String {
    let ns = if latitude >= 0.0 { "N" } else { "S" };
    let ew = if longitude >= 0.0 { "E" } else { "W" };
    format!("{:.2}°{}, {:.2}°{}", latitude.abs(), ns, longitude.abs(), ew)
}

impl PlainTextBuilder {
    /// Out-of-range offsets fall back to UTC.
    pub fn new(display_utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(display_utc_offset_hours.saturating_mul(3600))
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    fn format_time(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.offset);
        format!("{} (UTC{})", local.format("%Y-%m-%d %H:%M:%S"), self.offset)
    }
}

impl MessageBuilder for PlainTextBuilder {
    fn build(&self, event: &DisasterEvent) -> Result<Notification, OrchestratorError> {
        let mut lines = vec![format!("[{}] {}", event.disaster_type, event.source.label())];

        match &event.data {
            EventPayload::Earthquake(eq) => {
                if !eq.place_name.is_empty() {
                    lines.push(format!("Location: {}", eq.place_name));
                }
                if eq.has_valid_epicenter() {
                    lines.push(format!("Epicenter: {}", format_coordinates(eq.latitude, eq.longitude)));
                }
                if let Some(magnitude) = eq.magnitude {
                    lines.push(format!("Magnitude: M{:.1}", magnitude));
                }
                if let Some(depth) = eq.depth {
                    lines.push(format!("Depth: {:.0} km", depth));
                }
                if let Some(intensity) = eq.intensity {
                    lines.push(format!("Max intensity: {:.1}", intensity));
                }
                if let Some(scale) = eq.scale {
                    lines.push(format!("Max scale: {:.1}", scale));
                }
                if event.source.is_early_warning() {
                    let marker = if eq.is_final { " (final)" } else { "" };
                    lines.push(format!("Report #{}{}", eq.updates, marker));
                }
                if let Some(local) = &eq.local_estimate {
                    lines.push(format!(
                        "{}: {:.0} km away, estimated intensity {:.1}",
                        local.place_name, local.distance_km, local.intensity
                    ));
                }
            }
            EventPayload::Tsunami(t) => {
                lines.push(t.title.clone());
                if !t.level.is_empty() {
                    lines.push(format!("Level: {}", t.level));
                }
                if !t.areas.is_empty() {
                    lines.push(format!("Areas: {}", t.areas.join(", ")));
                }
            }
            EventPayload::Weather(w) => {
                lines.push(w.display_headline().to_string());
                if !w.description.is_empty() {
                    lines.push(w.description.clone());
                }
            }
        }

        if let Some(at) = event.event_time() {
            lines.push(format!("Time: {}", self.format_time(at)));
        }

        let text = lines.join("\n");
        if text.trim().is_empty() {
            return Err(OrchestratorError::Build(format!("event {} rendered empty", event.id)));
        }
        Ok(Notification::text(text))
    }

    fn map_document(&self, event: &DisasterEvent) -> Option<(String, String)> {
        let eq = event.as_earthquake()?;
        if !eq.has_valid_epicenter() {
            return None;
        }
        let html = format!(
            r#"<html><body><div id="card-wrapper" data-lat="{lat}" data-lon="{lon}" data-zoom="5"><div id="map"></div><p>{place} M{mag}</p></div></body></html>"#,
            lat = eq.latitude,
            lon = eq.longitude,
            place = escape_html(&eq.place_name),
            mag = eq.magnitude.map_or_else(|| "?".to_string(), |m| format!("{:.1}", m)),
        );
        Some((html, MAP_SELECTOR.to_string()))
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quake_core::{DataSource, DisasterType, EarthquakeData, EventTime, LocalEstimate};

    fn eew() -> DisasterEvent {
        let mut eq = EarthquakeData::new("jma-1", 35.0, 135.0);
        eq.place_name = "Kyoto".to_string();
        eq.magnitude = Some(6.04);
        eq.depth = Some(10.0);
        eq.scale = Some(4.0);
        eq.updates = 3;
        eq.is_final = true;
        eq.shock_time = Some(EventTime::from(Utc.with_ymd_and_hms(2024, 1, 1, 7, 10, 0).unwrap()));
        eq.local_estimate = Some(LocalEstimate {
            place_name: "Osaka".to_string(),
            distance_km: 42.0,
            intensity: 4.5,
            allowed: true,
        });
        DisasterEvent::earthquake(DataSource::JmaP2p, DisasterType::EarthquakeWarning, eq)
    }

    #[test]
    fn test_earthquake_card() {
        let text = PlainTextBuilder::new(9).build(&eew()).unwrap().text;
        assert!(text.starts_with("[earthquake_warning] JMA EEW"));
        assert!(text.contains("Location: Kyoto"));
        assert!(text.contains("35.00°N, 135.00°E"));
        assert!(text.contains("Magnitude: M6.0"));
        assert!(text.contains("Report #3 (final)"));
        assert!(text.contains("Osaka: 42 km away"));
        assert!(text.contains("2024-01-01 16:10:00 (UTC+09:00)"));
    }

    #[test]
    fn test_map_document_requires_epicenter() {
        let builder = PlainTextBuilder::default();
        let (html, selector) = builder.map_document(&eew()).unwrap();
        assert_eq!(selector, MAP_SELECTOR);
        assert!(html.contains("data-lat=\"35\""));

        let mut unknown = eew();
        let eq = unknown.as_earthquake_mut().unwrap();
        eq.latitude = 0.0;
        eq.longitude = 0.0;
        assert!(builder.map_document(&unknown).is_none());
    }

    #[test]
    fn test_map_document_escapes_place_name() {
        let mut event = eew();
        event.as_earthquake_mut().unwrap().place_name = r#"Off <Kii> "Peninsula" & Tokai"#.to_string();

        let (html, _) = PlainTextBuilder::default().map_document(&event).unwrap();
        assert!(html.contains("Off &lt;Kii&gt; &quot;Peninsula&quot; &amp; Tokai M6.0"));
        assert!(!html.contains("<Kii>"));
    }
}
