use quake_core::{estimate_intensity, DisasterEvent, LocalEstimate};
use tracing::{debug, info};

use crate::config::LocalSiteConfig;

/// Writes the estimated shaking at the subscriber's site onto earthquakes.
pub struct LocalSiteFilter {
    config: LocalSiteConfig,
}

impl LocalSiteFilter {
    pub fn new(config: LocalSiteConfig) -> Self {
        Self { config }
    }

    /// Annotate the event and report whether it may proceed.
    ///
    /// The annotation is written even when strict mode vetoes the event.
    pub fn annotate(&self, event: &mut DisasterEvent) -> bool {
        if !self.config.enabled {
            return true;
        }
        let Some(eq) = event.as_earthquake_mut() else {
            return true;
        };
        let Some(magnitude) = eq.magnitude else {
            return true;
        };
        if !eq.has_valid_epicenter() {
            return true;
        }

        let site = (self.config.latitude, self.config.longitude);
        let (distance_km, intensity) =
            estimate_intensity(magnitude, eq.depth, (eq.latitude, eq.longitude), site);
        let allowed = intensity >= self.config.intensity_threshold;
        debug!(
            "Local estimate for {}: {:.1} km, intensity {:.1}",
            self.config.place_name, distance_km, intensity
        );

        eq.local_estimate = Some(LocalEstimate {
            place_name: self.config.place_name.clone(),
            distance_km,
            intensity,
            allowed,
        });

        if self.config.strict_mode && !allowed {
            info!(
                "{} vetoed: local intensity {:.1} below {}",
                eq.id, intensity, self.config.intensity_threshold
            );
            return false;
        }
        true
    }
}
