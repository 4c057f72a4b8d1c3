//! The catalogue of known feeds and the policies keyed on them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::naive_offset_seconds;

/// Every feed the pipeline knows how to route and filter.
///
/// The serialized form is the stable source id used in configuration and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    CeaFanstudio,
    CeaWolfx,
    CwaFanstudio,
    CwaWolfx,
    JmaFanstudio,
    JmaP2p,
    JmaWolfx,
    CwaFanstudioReport,
    CencFanstudio,
    CencWolfx,
    JmaP2pInfo,
    JmaWolfxInfo,
    UsgsFanstudio,
    GlobalQuake,
    ChinaWeatherFanstudio,
    ChinaTsunamiFanstudio,
    JmaTsunamiP2p,
}

/// Which source-class filter applies to a feed's earthquakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterClass {
    /// Magnitude plus estimated intensity from the Global Quake network.
    GlobalQuake,
    /// Magnitude plus Chinese seismic intensity.
    Intensity,
    /// Magnitude plus JMA shindo scale.
    Scale,
    /// Magnitude alone.
    MagnitudeOnly,
    /// Not an earthquake feed.
    None,
}

/// Early-warning feed families that share one report throttle setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFamily {
    CeaCwa,
    Jma,
    GlobalQuake,
}

impl DataSource {
    pub const ALL: [DataSource; 17] = [
        DataSource::CeaFanstudio,
        DataSource::CeaWolfx,
        DataSource::CwaFanstudio,
        DataSource::CwaWolfx,
        DataSource::JmaFanstudio,
        DataSource::JmaP2p,
        DataSource::JmaWolfx,
        DataSource::CwaFanstudioReport,
        DataSource::CencFanstudio,
        DataSource::CencWolfx,
        DataSource::JmaP2pInfo,
        DataSource::JmaWolfxInfo,
        DataSource::UsgsFanstudio,
        DataSource::GlobalQuake,
        DataSource::ChinaWeatherFanstudio,
        DataSource::ChinaTsunamiFanstudio,
        DataSource::JmaTsunamiP2p,
    ];

    /// Stable identifier, identical to the serde form.
    pub fn id(&self) -> &'static str {
        match self {
            DataSource::CeaFanstudio => "cea_fanstudio",
            DataSource::CeaWolfx => "cea_wolfx",
            DataSource::CwaFanstudio => "cwa_fanstudio",
            DataSource::CwaWolfx => "cwa_wolfx",
            DataSource::JmaFanstudio => "jma_fanstudio",
            DataSource::JmaP2p => "jma_p2p",
            DataSource::JmaWolfx => "jma_wolfx",
            DataSource::CwaFanstudioReport => "cwa_fanstudio_report",
            DataSource::CencFanstudio => "cenc_fanstudio",
            DataSource::CencWolfx => "cenc_wolfx",
            DataSource::JmaP2pInfo => "jma_p2p_info",
            DataSource::JmaWolfxInfo => "jma_wolfx_info",
            DataSource::UsgsFanstudio => "usgs_fanstudio",
            DataSource::GlobalQuake => "global_quake",
            DataSource::ChinaWeatherFanstudio => "china_weather_fanstudio",
            DataSource::ChinaTsunamiFanstudio => "china_tsunami_fanstudio",
            DataSource::JmaTsunamiP2p => "jma_tsunami_p2p",
        }
    }

    /// Look up a source by its identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.id() == id)
    }

    /// Human-readable feed label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            DataSource::CeaFanstudio | DataSource::CeaWolfx => "China Earthquake Administration EEW",
            DataSource::CwaFanstudio | DataSource::CwaWolfx => "Taiwan CWA EEW",
            DataSource::CwaFanstudioReport => "Taiwan CWA Report",
            DataSource::JmaFanstudio | DataSource::JmaP2p | DataSource::JmaWolfx => "JMA EEW",
            DataSource::JmaP2pInfo | DataSource::JmaWolfxInfo => "JMA Earthquake Information",
            DataSource::CencFanstudio | DataSource::CencWolfx => "CENC Earthquake Report",
            DataSource::UsgsFanstudio => "USGS Earthquake Report",
            DataSource::GlobalQuake => "Global Quake",
            DataSource::ChinaWeatherFanstudio => "China Weather Warning",
            DataSource::ChinaTsunamiFanstudio => "China Tsunami Warning",
            DataSource::JmaTsunamiP2p => "JMA Tsunami Forecast",
        }
    }

    /// Whether the feed issues rapidly refined early-warning reports.
    pub fn is_early_warning(&self) -> bool {
        self.report_family().is_some()
    }

    pub fn report_family(&self) -> Option<ReportFamily> {
        match self {
            DataSource::CeaFanstudio
            | DataSource::CeaWolfx
            | DataSource::CwaFanstudio
            | DataSource::CwaWolfx => Some(ReportFamily::CeaCwa),
            DataSource::JmaFanstudio | DataSource::JmaP2p | DataSource::JmaWolfx => {
                Some(ReportFamily::Jma)
            }
            DataSource::GlobalQuake => Some(ReportFamily::GlobalQuake),
            _ => None,
        }
    }

    pub fn filter_class(&self) -> FilterClass {
        match self {
            DataSource::GlobalQuake => FilterClass::GlobalQuake,
            DataSource::CeaFanstudio
            | DataSource::CeaWolfx
            | DataSource::CwaFanstudio
            | DataSource::CwaWolfx
            | DataSource::CwaFanstudioReport
            | DataSource::CencFanstudio
            | DataSource::CencWolfx => FilterClass::Intensity,
            DataSource::JmaFanstudio
            | DataSource::JmaP2p
            | DataSource::JmaWolfx
            | DataSource::JmaP2pInfo
            | DataSource::JmaWolfxInfo => FilterClass::Scale,
            DataSource::UsgsFanstudio => FilterClass::MagnitudeOnly,
            DataSource::ChinaWeatherFanstudio
            | DataSource::ChinaTsunamiFanstudio
            | DataSource::JmaTsunamiP2p => FilterClass::None,
        }
    }

    /// Early-warning feeds that get a follow-up map artifact.
    pub fn splits_map(&self) -> bool {
        matches!(
            self,
            DataSource::CeaFanstudio
                | DataSource::CeaWolfx
                | DataSource::CwaFanstudio
                | DataSource::CwaWolfx
                | DataSource::JmaFanstudio
                | DataSource::JmaWolfx
                | DataSource::JmaP2p
        )
    }

    /// UTC offset assumed for naive timestamps from this feed.
    pub fn naive_offset_seconds(&self) -> i32 {
        naive_offset_seconds(self.id())
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
