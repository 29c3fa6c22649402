//! Occupancy prediction values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse occupancy class used to colour map markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
    Available,
    Moderate,
    Busy,
    Full,
}

impl OccupancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Moderate => "moderate",
            Self::Busy => "busy",
            Self::Full => "full",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Moderate => "Moderately busy",
            Self::Busy => "Busy",
            Self::Full => "Full",
        }
    }

    /// Marker colour for the map layer.
    pub fn marker_color(&self) -> &'static str {
        match self {
            Self::Available => "#22c55e",
            Self::Moderate => "#eab308",
            Self::Busy => "#f97316",
            Self::Full => "#ef4444",
        }
    }
}

impl std::fmt::Display for OccupancyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Usage cut-offs for [`OccupancyStatus`]; each bound is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusThresholds {
    pub full: f64,
    pub busy: f64,
    pub moderate: f64,
}

impl StatusThresholds {
    pub fn classify(&self, usage: f64) -> OccupancyStatus {
        if usage >= self.full {
            OccupancyStatus::Full
        } else if usage >= self.busy {
            OccupancyStatus::Busy
        } else if usage >= self.moderate {
            OccupancyStatus::Moderate
        } else {
            OccupancyStatus::Available
        }
    }
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            full: 0.9,
            busy: 0.7,
            moderate: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyPrediction {
    /// Fraction of charging points in use, 0–1
    pub predicted_usage: f64,
    /// 0–1
    pub confidence: f64,
    /// Free charging points
    pub availability: u32,
    /// Expected wait in minutes
    pub wait_time: u32,
    pub status: OccupancyStatus,
}

/// One point of an hourly forecast series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub hour: DateTime<Utc>,
    pub prediction: OccupancyPrediction,
}
