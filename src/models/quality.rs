use serde::{Deserialize, Serialize};
use std::fmt;

/// Air quality level derived from AQI via fixed breakpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    LightlyPolluted,
    ModeratelyPolluted,
    HeavilyPolluted,
    SeverelyPolluted,
}

impl QualityLevel {
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi <= 50.0 {
            QualityLevel::Excellent
        } else if aqi <= 100.0 {
            QualityLevel::Good
        } else if aqi <= 150.0 {
            QualityLevel::LightlyPolluted
        } else if aqi <= 200.0 {
            QualityLevel::ModeratelyPolluted
        } else if aqi <= 300.0 {
            QualityLevel::HeavilyPolluted
        } else {
            QualityLevel::SeverelyPolluted
        }
    }

    /// Label stored in the `quality_level` column
    pub fn label(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "优",
            QualityLevel::Good => "良",
            QualityLevel::LightlyPolluted => "轻度污染",
            QualityLevel::ModeratelyPolluted => "中度污染",
            QualityLevel::HeavilyPolluted => "重度污染",
            QualityLevel::SeverelyPolluted => "严重污染",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let level = match label {
            "优" => QualityLevel::Excellent,
            "良" => QualityLevel::Good,
            "轻度污染" => QualityLevel::LightlyPolluted,
            "中度污染" => QualityLevel::ModeratelyPolluted,
            "重度污染" => QualityLevel::HeavilyPolluted,
            "严重污染" => QualityLevel::SeverelyPolluted,
            _ => return None,
        };
        Some(level)
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
