//! Domain records shared by the pipeline, the service and the result store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of the sampled water.
///
/// Unrecognized names map to `Unknown`, so records coming from older clients or
/// the remote service always deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WaterSource {
    TapWater,
    WellWater,
    LakePond,
    RiverStream,
    SwimmingPool,
    BottledWater,
    Unknown,
}

impl WaterSource {
    pub const ALL: [WaterSource; 7] = [
        WaterSource::TapWater,
        WaterSource::WellWater,
        WaterSource::LakePond,
        WaterSource::RiverStream,
        WaterSource::SwimmingPool,
        WaterSource::BottledWater,
        WaterSource::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WaterSource::TapWater => "Tap Water",
            WaterSource::WellWater => "Well Water",
            WaterSource::LakePond => "Lake/Pond",
            WaterSource::RiverStream => "River/Stream",
            WaterSource::SwimmingPool => "Swimming Pool",
            WaterSource::BottledWater => "Bottled Water",
            WaterSource::Unknown => "Unknown",
        }
    }

    /// Accepts display names ("Tap Water") and snake-case keys ("tap_water").
    pub fn parse(value: &str) -> Self {
        let key: String = value
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '/' || c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        match key.as_str() {
            "tap_water" | "tap" => WaterSource::TapWater,
            "well_water" | "well" => WaterSource::WellWater,
            "lake_pond" | "lake" | "pond" => WaterSource::LakePond,
            "river_stream" | "river" | "stream" => WaterSource::RiverStream,
            "swimming_pool" | "pool" => WaterSource::SwimmingPool,
            "bottled_water" | "bottled" => WaterSource::BottledWater,
            _ => WaterSource::Unknown,
        }
    }
}

impl fmt::Display for WaterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl From<String> for WaterSource {
    fn from(value: String) -> Self {
        WaterSource::parse(&value)
    }
}

impl From<WaterSource> for String {
    fn from(value: WaterSource) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// The six estimated water parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterParameters {
    /// pH, 5.5..=9.5 when estimated locally.
    pub ph: f64,
    /// Free chlorine in ppm, 0.1..=5.0.
    pub chlorine: f64,
    /// Nitrates in ppm, 0.5..=25.
    pub nitrates: f64,
    /// Total hardness in ppm, 50..=400.
    pub hardness: f64,
    /// Total alkalinity in ppm, 30..=300.
    pub alkalinity: f64,
    /// Bacteria indicator count; 0 means none detected.
    pub bacteria: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OverallQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    #[serde(rename = "Unsafe for Consumption")]
    UnsafeForConsumption,
}

impl OverallQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallQuality::Excellent => "Excellent",
            OverallQuality::Good => "Good",
            OverallQuality::Fair => "Fair",
            OverallQuality::Poor => "Poor",
            OverallQuality::UnsafeForConsumption => "Unsafe for Consumption",
        }
    }
}

impl fmt::Display for OverallQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SafetyLevel {
    Safe,
    Caution,
    Unsafe,
    Critical,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "Safe",
            SafetyLevel::Caution => "Caution",
            SafetyLevel::Unsafe => "Unsafe",
            SafetyLevel::Critical => "Critical",
        }
    }


    /// Results at this level raise a stored alert.
    pub fn raises_alert(&self) -> bool {
        matches!(self, SafetyLevel::Unsafe | SafetyLevel::Critical)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which path produced the parameter estimates of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    /// The remote analysis service answered.
    Remote,
    /// The optional external analysis tool answered.
    ExternalTool,
    /// The in-process heuristic estimator.
    LocalHeuristic,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMethod::Remote => "remote",
            ProcessingMethod::ExternalTool => "external_tool",
            ProcessingMethod::LocalHeuristic => "local_heuristic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorChannels {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// A finished analysis that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterTestDraft {
    pub water_source: WaterSource,
    pub location: Option<GeoPoint>,
    pub user_id: Option<String>,
    pub results: WaterParameters,
    pub overall_quality: OverallQuality,
    pub safety_level: SafetyLevel,
    pub confidence: u8,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
    pub processing_method: ProcessingMethod,
    pub processing_time_secs: f64,
    pub color_channels: ColorChannels,
}

/// A persisted water test. `id` and `timestamp` are assigned once by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterTestResult {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub water_source: WaterSource,
    pub location: Option<GeoPoint>,
    pub user_id: Option<String>,
    pub results: WaterParameters,
    pub overall_quality: OverallQuality,
    pub safety_level: SafetyLevel,
    pub confidence: u8,
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
    pub processing_method: ProcessingMethod,
    pub processing_time_secs: f64,
    pub color_channels: ColorChannels,
}

impl WaterTestResult {
    pub fn from_draft(draft: WaterTestDraft, id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            water_source: draft.water_source,
            location: draft.location,
            user_id: draft.user_id,
            results: draft.results,
            overall_quality: draft.overall_quality,
            safety_level: draft.safety_level,
            confidence: draft.confidence,
            alerts: draft.alerts,
            recommendations: draft.recommendations,
            processing_method: draft.processing_method,
            processing_time_secs: draft.processing_time_secs,
            color_channels: draft.color_channels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn for_safety(level: SafetyLevel) -> Self {
        match level {
            SafetyLevel::Critical => AlertSeverity::Critical,
            SafetyLevel::Unsafe => AlertSeverity::High,
            SafetyLevel::Safe | SafetyLevel::Caution => AlertSeverity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// A contamination alert derived from an unsafe test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    /// Weak reference to the originating `WaterTestResult`.
    pub test_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub water_source: WaterSource,
    /// Flips false -> true exactly once.
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A reference reading used to calibrate color matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRecord {
    pub id: String,
    pub parameter: String,
    pub color_value: ColorChannels,
    pub actual_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Parameters reported by an analyzer other than the local heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub parameters: WaterParameters,
    pub confidence: u8,
    pub color_channels: ColorChannels,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_source_parses_names_and_keys() {
        assert_eq!(WaterSource::parse("Tap Water"), WaterSource::TapWater);
        assert_eq!(WaterSource::parse("river_stream"), WaterSource::RiverStream);
        assert_eq!(WaterSource::parse("Lake/Pond"), WaterSource::LakePond);
        assert_eq!(WaterSource::parse("rain barrel"), WaterSource::Unknown);
        for source in WaterSource::ALL {
            assert_eq!(WaterSource::parse(source.as_str()), source);
        }
    }

    #[test]
    fn water_source_serializes_as_display_name() {
        let json = serde_json::to_string(&WaterSource::SwimmingPool).unwrap();
        assert_eq!(json, "\"Swimming Pool\"");
        let parsed: WaterSource = serde_json::from_str("\"Something Else\"").unwrap();
        assert_eq!(parsed, WaterSource::Unknown);
    }

    #[test]
    fn quality_uses_spaced_name_on_the_wire() {
        let json = serde_json::to_string(&OverallQuality::UnsafeForConsumption).unwrap();
        assert_eq!(json, "\"Unsafe for Consumption\"");
        let parsed: OverallQuality = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, OverallQuality::UnsafeForConsumption);
    }

    #[test]
    fn only_unsafe_levels_raise_alerts() {
        assert!(!SafetyLevel::Safe.raises_alert());
        assert!(!SafetyLevel::Caution.raises_alert());
        assert!(SafetyLevel::Unsafe.raises_alert());
        assert!(SafetyLevel::Critical.raises_alert());
    }
}
