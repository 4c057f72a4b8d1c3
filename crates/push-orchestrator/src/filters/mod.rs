//! The ordered delivery policy chain.
//!
//! Stages run cheapest first and the first veto wins:
//!
//! 1. [`StalenessFilter`] - drops replayed backlog
//! 2. [`WeatherFilter`] - headline terms and warning level (weather only)
//! 3. [`KeywordFilter`] - place-name terms (earthquakes only)
//! 4. [`SourceClassFilter`] - magnitude plus the feed's secondary metric
//! 5. [`ReportThrottle`] - every Nth early-warning refinement
//! 6. [`LocalSiteFilter`] - local shaking annotation, veto in strict mode
//!
//! Only the throttle keeps state, and it is committed after the whole chain
//! has accepted an event.

mod keyword;
mod local;
mod report;
mod source_class;
mod staleness;
mod weather;

use std::fmt;

use chrono::{DateTime, Utc};
use quake_core::DisasterEvent;
use tracing::debug;

use crate::config::PushConfig;

pub use keyword::KeywordFilter;
pub use local::LocalSiteFilter;
pub use report::ReportThrottle;
pub use source_class::SourceClassFilter;
pub use staleness::StalenessFilter;
pub use weather::{WarningLevel, WeatherFilter};

/// The stage that vetoed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStage {
    Staleness,
    Weather,
    Keyword,
    SourceClass,
    ReportThrottle,
    LocalSite,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterStage::Staleness => "staleness",
            FilterStage::Weather => "weather",
            FilterStage::Keyword => "keyword",
            FilterStage::SourceClass => "source_class",
            FilterStage::ReportThrottle => "report_throttle",
            FilterStage::LocalSite => "local_site",
        };
        f.write_str(name)
    }
}

/// All six stages, built once from configuration.
pub struct FilterChain {
    staleness: StalenessFilter,
    weather: WeatherFilter,
    keyword: KeywordFilter,
    source_class: SourceClassFilter,
    throttle: ReportThrottle,
    local: LocalSiteFilter,
}

impl FilterChain {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            staleness: StalenessFilter::new(config.max_event_age_minutes),
            weather: WeatherFilter::new(config.filters.weather.clone()),
            keyword: KeywordFilter::new(config.filters.keyword.clone()),
            source_class: SourceClassFilter::new(config.filters.clone()),
            throttle: ReportThrottle::new(config.report_control.clone()),
            local: LocalSiteFilter::new(config.local_monitor.clone()),
        }
    }

    fn stateless(&self, event: &DisasterEvent, now: DateTime<Utc>) -> Result<(), FilterStage> {
        if !self.staleness.allows(event, now) {
            return Err(FilterStage::Staleness);
        }
        if !self.weather.allows(event) {
            return Err(FilterStage::Weather);
        }
        if !self.keyword.allows(event) {
            return Err(FilterStage::Keyword);
        }
        if !self.source_class.allows(event) {
            return Err(FilterStage::SourceClass);
        }
        Ok(())
    }

    /// Run every stage, annotating the event with the local estimate.
    ///
    /// On acceptance the throttle records the report; a rejected event
    /// leaves no trace, so re-running the chain on it gives the same verdict.
    pub async fn evaluate(&self, event: &mut DisasterEvent, now: DateTime<Utc>) -> Result<(), FilterStage> {
        self.stateless(event, now)?;

        let mut seen = self.throttle.lock().await;
        if !self.throttle.admits(&seen, event) {
            debug!("{} report #{} throttled", event.event_id(), event.updates());
            return Err(FilterStage::ReportThrottle);
        }
        if !self.local.annotate(event) {
            return Err(FilterStage::LocalSite);
        }
        self.throttle.commit(&mut seen, event, now);
        Ok(())
    }

    /// Evaluate a copy without committing throttle state.
    ///
    /// Returns the annotated copy when every stage accepts.
    pub async fn dry_run(&self, event: &DisasterEvent, now: DateTime<Utc>) -> Result<DisasterEvent, FilterStage> {
        let mut copy = event.clone();
        self.stateless(&copy, now)?;

        let seen = self.throttle.lock().await;
        if !self.throttle.admits(&seen, &copy) {
            return Err(FilterStage::ReportThrottle);
        }
        if !self.local.annotate(&mut copy) {
            return Err(FilterStage::LocalSite);
        }
        Ok(copy)
    }

    /// Drop throttle entries not touched since `cutoff`.
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.throttle.purge_before(cutoff).await
    }

    pub async fn throttle_len(&self) -> usize {
        self.throttle.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalSiteConfig;
    use quake_core::{DataSource, DisasterType, EarthquakeData, EventTime};

    fn eew(event_id: &str, updates: u32, magnitude: f64) -> DisasterEvent {
        let mut eq = EarthquakeData::new(format!("{}-{}", event_id, updates), 35.0, 135.0);
        eq.event_id = event_id.to_string();
        eq.updates = updates;
        eq.magnitude = Some(magnitude);
        eq.scale = Some(3.0);
        eq.shock_time = Some(EventTime::from(Utc::now()));
        DisasterEvent::earthquake(DataSource::JmaP2p, DisasterType::EarthquakeWarning, eq)
    }

    #[tokio::test]
    async fn test_rejection_is_idempotent() {
        let chain = FilterChain::new(&PushConfig::default());
        let now = Utc::now();

        let mut first = eew("ev", 1, 5.0);
        assert!(chain.evaluate(&mut first, now).await.is_ok());

        let mut second = eew("ev", 2, 5.0);
        assert_eq!(chain.evaluate(&mut second, now).await, Err(FilterStage::ReportThrottle));
        assert_eq!(chain.evaluate(&mut second, now).await, Err(FilterStage::ReportThrottle));

        let mut tiny = eew("other", 1, 1.0);
        assert_eq!(chain.evaluate(&mut tiny, now).await, Err(FilterStage::SourceClass));
        assert_eq!(chain.evaluate(&mut tiny, now).await, Err(FilterStage::SourceClass));
        assert_eq!(chain.throttle_len().await, 1);
    }

    #[tokio::test]
    async fn test_local_veto_does_not_advance_throttle() {
        let config = PushConfig::default().with_local_site(LocalSiteConfig {
            enabled: true,
            latitude: 45.0,
            longitude: 80.0,
            intensity_threshold: 6.0,
            strict_mode: true,
            ..Default::default()
        });
        let chain = FilterChain::new(&config);

        let mut event = eew("far", 1, 5.0);
        assert_eq!(chain.evaluate(&mut event, Utc::now()).await, Err(FilterStage::LocalSite));
        assert!(event.as_earthquake().unwrap().local_estimate.is_some());
        assert_eq!(chain.throttle_len().await, 0);
    }

    #[tokio::test]
    async fn test_dry_run_commits_nothing() {
        let chain = FilterChain::new(&PushConfig::default());
        let event = eew("ev", 1, 5.0);

        assert!(chain.dry_run(&event, Utc::now()).await.is_ok());
        assert_eq!(chain.throttle_len().await, 0);
    }

    #[tokio::test]
    async fn test_stale_event_rejected_first() {
        let chain = FilterChain::new(&PushConfig::default());
        let mut event = eew("old", 1, 1.0);
        let old = Utc::now() - chrono::Duration::hours(2);
        event.as_earthquake_mut().unwrap().shock_time = Some(EventTime::from(old));

        assert_eq!(chain.evaluate(&mut event, Utc::now()).await, Err(FilterStage::Staleness));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(FilterStage::ReportThrottle.to_string(), "report_throttle");
    }
}
