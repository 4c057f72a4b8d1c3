use quake_core::{DisasterEvent, FilterClass};
use tracing::info;

use crate::config::FilterConfig;

/// Minimum magnitude plus the feed's secondary metric.
///
/// Both thresholds must clear where both values are reported; an absent
/// value is not held against the event.
pub struct SourceClassFilter {
    config: FilterConfig,
}

fn clears(value: Option<f64>, min: f64) -> bool {
    value.map_or(true, |v| v >= min)
}

impl SourceClassFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn allows(&self, event: &DisasterEvent) -> bool {
        let Some(eq) = event.as_earthquake() else {
            return true;
        };

        let f = &self.config;
        let pass = match event.source.filter_class() {
            FilterClass::GlobalQuake => {
                !f.global_quake.enabled
                    || (clears(eq.magnitude, f.global_quake.min_magnitude)
                        && clears(eq.intensity, f.global_quake.min_intensity))
            }
            FilterClass::Intensity => {
                !f.intensity.enabled
                    || (clears(eq.magnitude, f.intensity.min_magnitude)
                        && clears(eq.intensity, f.intensity.min_intensity))
            }
            FilterClass::Scale => {
                !f.scale.enabled
                    || (clears(eq.magnitude, f.scale.min_magnitude) && clears(eq.scale, f.scale.min_scale))
            }
            FilterClass::MagnitudeOnly => {
                !f.magnitude_only.enabled || clears(eq.magnitude, f.magnitude_only.min_magnitude)
            }
            FilterClass::None => true,
        };

        if !pass {
            info!(
                "{} M{:?} intensity {:?} scale {:?} below {} thresholds",
                event.id,
                eq.magnitude,
                eq.intensity,
                eq.scale,
                event.source
            );
        }
        pass
    }
}
