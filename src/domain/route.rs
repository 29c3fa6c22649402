//! Data handed to the map layer
//!
//! Route geometry comes from an external routing service; this crate only
//! attaches charging stops with their live occupancy.

use serde::{Deserialize, Serialize};

use super::prediction::{OccupancyPrediction, OccupancyStatus};
use super::station::{GeoPoint, Station};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapMarker {
    pub station_id: u32,
    pub name: String,
    pub position: GeoPoint,
    pub status: OccupancyStatus,
    pub label: String,
    pub color: String,
    pub availability: u32,
    pub wait_time: u32,
}

impl MapMarker {
    pub fn new(station: &Station, prediction: &OccupancyPrediction) -> Self {
        Self {
            station_id: station.id,
            name: station.name.clone(),
            position: station.position,
            status: prediction.status,
            label: format!(
                "{} · {} free · ~{} min wait",
                prediction.status.label(),
                prediction.availability,
                prediction.wait_time
            ),
            color: prediction.status.marker_color().to_string(),
            availability: prediction.availability,
            wait_time: prediction.wait_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOverlay {
    pub geometry: Vec<GeoPoint>,
    pub charging_stops: Vec<MapMarker>,
}

impl RouteOverlay {
    pub fn new(geometry: Vec<GeoPoint>, charging_stops: Vec<MapMarker>) -> Self {
        Self {
            geometry,
            charging_stops,
        }
    }
}
