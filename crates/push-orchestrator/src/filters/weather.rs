use quake_core::{DisasterEvent, EventPayload};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::WeatherFilterConfig;

/// Colour grade of a weather warning, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    Blue,
    Yellow,
    Orange,
    Red,
}

impl WarningLevel {
    /// Detect the grade named in a headline, highest grade first.
    pub fn detect(headline: &str) -> Option<Self> {
        let lower = headline.to_lowercase();
        let grades = [
            (WarningLevel::Red, "red", "红色"),
            (WarningLevel::Orange, "orange", "橙色"),
            (WarningLevel::Yellow, "yellow", "黄色"),
            (WarningLevel::Blue, "blue", "蓝色"),
        ];
        grades
            .into_iter()
            .find(|(_, en, zh)| lower.contains(en) || headline.contains(zh))
            .map(|(level, _, _)| level)
    }
}

pub struct WeatherFilter {
    config: WeatherFilterConfig,
}

impl WeatherFilter {
    pub fn new(config: WeatherFilterConfig) -> Self {
        Self { config }
    }

    /// Non-weather events always pass. A headline with no detectable grade
    /// is not held to `min_level`.
    pub fn allows(&self, event: &DisasterEvent) -> bool {
        let EventPayload::Weather(alarm) = &event.data else {
            return true;
        };
        if !self.config.enabled {
            return true;
        }

        let headline = alarm.display_headline();
        if let Some(term) = self.config.blacklist.iter().find(|t| headline.contains(t.as_str())) {
            info!("Weather warning '{}' blocked by term '{}'", headline, term);
            return false;
        }
        if !self.config.whitelist.is_empty()
            && !self.config.whitelist.iter().any(|t| headline.contains(t.as_str()))
        {
            info!("Weather warning '{}' matches no whitelist term", headline);
            return false;
        }
        if let (Some(min), Some(level)) = (self.config.min_level, WarningLevel::detect(headline)) {
            if level < min {
                info!("Weather warning '{}' below minimum level {:?}", headline, min);
                return false;
            }
        }
        true
    }
}
