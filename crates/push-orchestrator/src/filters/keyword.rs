use quake_core::DisasterEvent;
use tracing::info;

use crate::config::KeywordFilterConfig;

/// Place-name blacklist and whitelist for earthquakes. Case-insensitive.
pub struct KeywordFilter {
    enabled: bool,
    blacklist: Vec<String>,
    whitelist: Vec<String>,
}

impl KeywordFilter {
    pub fn new(config: KeywordFilterConfig) -> Self {
        let lower = |terms: Vec<String>| terms.into_iter().map(|t| t.to_lowercase()).collect();
        Self {
            enabled: config.enabled,
            blacklist: lower(config.blacklist),
            whitelist: lower(config.whitelist),
        }
    }

    pub fn allows(&self, event: &DisasterEvent) -> bool {
        let Some(eq) = event.as_earthquake() else {
            return true;
        };
        if !self.enabled {
            return true;
        }

        let place = eq.place_name.to_lowercase();
        if let Some(term) = self.blacklist.iter().find(|t| place.contains(t.as_str())) {
            info!("{} blocked by keyword '{}'", eq.place_name, term);
            return false;
        }
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|t| place.contains(t.as_str())) {
            info!("{} matches no whitelist keyword", eq.place_name);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quake_core::{DataSource, DisasterType, EarthquakeData};

    fn at(place: &str) -> DisasterEvent {
        let mut eq = EarthquakeData::new("a", 30.0, 103.0);
        eq.place_name = place.to_string();
        DisasterEvent::earthquake(DataSource::CencFanstudio, DisasterType::Earthquake, eq)
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let filter = KeywordFilter::new(KeywordFilterConfig {
            enabled: true,
            blacklist: vec!["Test".to_string()],
            whitelist: vec!["sichuan".to_string()],
        });
        assert!(filter.allows(&at("Sichuan Lushan")));
        assert!(!filter.allows(&at("Sichuan test site")));
        assert!(!filter.allows(&at("Yunnan Dali")));
    }

    #[test]
    fn test_empty_whitelist_accepts() {
        let filter = KeywordFilter::new(KeywordFilterConfig {
            enabled: true,
            ..Default::default()
        });
        assert!(filter.allows(&at("Anywhere")));
    }
}
