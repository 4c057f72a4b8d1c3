//! Policy configuration for the push pipeline.
//!
//! Every struct deserializes with `#[serde(default)]`, so a partial JSON
//! document only overrides what it names.

use std::time::Duration;

use quake_core::{DataSource, ReportFamily};
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::filters::WarningLevel;

/// Upper bound for a fusion wait.
pub const MAX_FUSION_TIMEOUT_SECONDS: f64 = 3600.0;

/// Upper bound for every minute-valued window (one year).
pub const MAX_WINDOW_MINUTES: u64 = 525_600;

/// Minutes as a chrono duration, saturating at [`MAX_WINDOW_MINUTES`].
pub(crate) fn minutes(value: u64) -> chrono::Duration {
    let bounded = value.min(MAX_WINDOW_MINUTES) as i64;
    chrono::Duration::try_minutes(bounded).unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub time_window_minutes: f64,
    pub location_tolerance_km: f64,
    pub magnitude_tolerance: f64,
    /// How long accepted events stay in the window before housekeeping drops them.
    pub retention_minutes: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: 1.0,
            location_tolerance_km: 20.0,
            magnitude_tolerance: 0.5,
            retention_minutes: 60,
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> chrono::Duration {
        let bounded = self.time_window_minutes.clamp(0.0, MAX_WINDOW_MINUTES as f64);
        chrono::Duration::try_milliseconds((bounded * 60_000.0) as i64).unwrap_or(chrono::Duration::MAX)
    }

    pub fn retention(&self) -> chrono::Duration {
        minutes(self.retention_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportControlConfig {
    pub cea_cwa_report_n: u32,
    pub jma_report_n: u32,
    pub gq_report_n: u32,
    pub final_report_always_push: bool,
    pub ignore_non_final_reports: bool,
}

impl Default for ReportControlConfig {
    fn default() -> Self {
        Self {
            cea_cwa_report_n: 1,
            jma_report_n: 3,
            gq_report_n: 5,
            final_report_always_push: true,
            ignore_non_final_reports: false,
        }
    }
}

impl ReportControlConfig {
    /// Report interval for a family; zero is treated as one.
    pub fn interval_for(&self, family: ReportFamily) -> u32 {
        let n = match family {
            ReportFamily::CeaCwa => self.cea_cwa_report_n,
            ReportFamily::Jma => self.jma_report_n,
            ReportFamily::GlobalQuake => self.gq_report_n,
        };
        n.max(1)
    }
}

/// Which source waits for which donor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionPolicy {
    pub enabled: bool,
    pub timeout_seconds: f64,
    pub interceptable: DataSource,
    pub donor: DataSource,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_seconds: 10.0,
            interceptable: DataSource::CencFanstudio,
            donor: DataSource::CencWolfx,
        }
    }
}

impl FusionPolicy {
    pub fn timeout(&self) -> Duration {
        let seconds = self.timeout_seconds.clamp(0.0, MAX_FUSION_TIMEOUT_SECONDS);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordFilterConfig {
    pub enabled: bool,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherFilterConfig {
    pub enabled: bool,
    pub blacklist: Vec<String>,
    pub whitelist: Vec<String>,
    pub min_level: Option<WarningLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensityFilterConfig {
    pub enabled: bool,
    pub min_magnitude: f64,
    pub min_intensity: f64,
}

impl Default for IntensityFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_magnitude: 2.0,
            min_intensity: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleFilterConfig {
    pub enabled: bool,
    pub min_magnitude: f64,
    pub min_scale: f64,
}

impl Default for ScaleFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_magnitude: 2.0,
            min_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnitudeFilterConfig {
    pub enabled: bool,
    pub min_magnitude: f64,
}

impl Default for MagnitudeFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_magnitude: 4.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalQuakeFilterConfig {
    pub enabled: bool,
    pub min_magnitude: f64,
    pub min_intensity: f64,
}

impl Default for GlobalQuakeFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_magnitude: 4.5,
            min_intensity: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub keyword: KeywordFilterConfig,
    pub weather: WeatherFilterConfig,
    pub intensity: IntensityFilterConfig,
    pub scale: ScaleFilterConfig,
    pub magnitude_only: MagnitudeFilterConfig,
    pub global_quake: GlobalQuakeFilterConfig,
}

/// The subscriber's own location for local shaking estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSiteConfig {
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub place_name: String,
    pub intensity_threshold: f64,
    /// Veto events whose local estimate is below the threshold.
    pub strict_mode: bool,
}

impl Default for LocalSiteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            latitude: 0.0,
            longitude: 0.0,
            place_name: "Local".to_string(),
            intensity_threshold: 2.0,
            strict_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFormatConfig {
    pub include_map: bool,
    /// Map artifacts go out for report 1, every Nth report and the final one.
    pub map_report_interval: u32,
    pub display_utc_offset_hours: i32,
}

impl Default for MessageFormatConfig {
    fn default() -> Self {
        Self {
            include_map: true,
            map_report_interval: 5,
            display_utc_offset_hours: 8,
        }
    }
}

/// Everything the push pipeline needs to decide and deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub dedup: DedupConfig,
    pub report_control: ReportControlConfig,
    pub fusion: FusionPolicy,
    pub filters: FilterConfig,
    pub local_monitor: LocalSiteConfig,
    pub message_format: MessageFormatConfig,
    /// Events older than this are dropped as replays.
    pub max_event_age_minutes: u64,
    /// Events arriving this soon after startup are dropped (feeds replay backlog on connect).
    pub startup_silence_seconds: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            report_control: ReportControlConfig::default(),
            fusion: FusionPolicy::default(),
            filters: FilterConfig::default(),
            local_monitor: LocalSiteConfig::default(),
            message_format: MessageFormatConfig::default(),
            max_event_age_minutes: 60,
            startup_silence_seconds: 0,
        }
    }
}

impl PushConfig {
    pub fn with_fusion(mut self, enabled: bool, timeout_seconds: f64) -> Self {
        self.fusion.enabled = enabled;
        self.fusion.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_local_site(mut self, site: LocalSiteConfig) -> Self {
        self.local_monitor = site;
        self
    }

    pub fn startup_silence(&self) -> Duration {
        Duration::from_secs(self.startup_silence_seconds)
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let dedup = &self.dedup;
        let tolerances = [
            ("dedup.time_window_minutes", dedup.time_window_minutes),
            ("dedup.location_tolerance_km", dedup.location_tolerance_km),
            ("dedup.magnitude_tolerance", dedup.magnitude_tolerance),
            ("fusion.timeout_seconds", self.fusion.timeout_seconds),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value < 0.0 {
                return Err(OrchestratorError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.fusion.timeout_seconds > MAX_FUSION_TIMEOUT_SECONDS {
            return Err(OrchestratorError::Config(format!(
                "fusion.timeout_seconds must be at most {}, got {}",
                MAX_FUSION_TIMEOUT_SECONDS, self.fusion.timeout_seconds
            )));
        }
        let windows = [
            ("dedup.time_window_minutes", dedup.time_window_minutes),
            ("dedup.retention_minutes", dedup.retention_minutes as f64),
            ("max_event_age_minutes", self.max_event_age_minutes as f64),
        ];
        for (name, value) in windows {
            if value > MAX_WINDOW_MINUTES as f64 {
                return Err(OrchestratorError::Config(format!(
                    "{} must be at most {} minutes, got {}",
                    name, MAX_WINDOW_MINUTES, value
                )));
            }
        }
        if self.fusion.enabled && self.fusion.interceptable == self.fusion.donor {
            return Err(OrchestratorError::Config(
                "fusion donor and interceptable source must differ".to_string(),
            ));
        }
        if self.local_monitor.enabled
            && !quake_core::is_valid_epicenter(self.local_monitor.latitude, self.local_monitor.longitude)
        {
            return Err(OrchestratorError::Config(
                "local_monitor is enabled without a valid location".to_string(),
            ));
        }
        Ok(())
    }
}
