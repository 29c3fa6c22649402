//! Charging station listing

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Charger class offered by a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargerType {
    /// AC, up to 22 kW
    Standard,
    /// DC, up to 150 kW
    Fast,
    /// DC, above 150 kW
    Rapid,
}

impl ChargerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Fast => "fast",
            Self::Rapid => "rapid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "fast" => Some(Self::Fast),
            "rapid" => Some(Self::Rapid),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChargerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: u32,
    pub name: String,
    pub location: String,
    pub charger_type: ChargerType,
    pub power_kw: u32,
    /// Static distance from the user, as listed
    pub distance_km: f64,
    pub position: GeoPoint,
}

impl Station {
    /// Case-insensitive substring match on name or location. An empty
    /// term matches everything.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.name.to_lowercase().contains(&term)
            || self.location.to_lowercase().contains(&term)
    }
}

/// Static usage profile of a station, fixed at predictor construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationPattern {
    /// Hours of day (0–23) with peak demand
    pub peak_hours: BTreeSet<u32>,
    pub base_occupancy: f64,
    pub location_multiplier: f64,
    /// Number of charging points
    pub capacity: u32,
}

impl StationPattern {
    pub fn is_peak(&self, hour: u32) -> bool {
        self.peak_hours.contains(&hour)
    }
}

/// Demo listing used by the simulator and tests.
pub fn demo_stations() -> Vec<Station> {
    vec![
        Station {
            id: 1,
            name: "Central Plaza Supercharge".into(),
            location: "Market Square, City Centre".into(),
            charger_type: ChargerType::Rapid,
            power_kw: 250,
            distance_km: 1.2,
            position: GeoPoint::new(51.5074, -0.1278),
        },
        Station {
            id: 2,
            name: "Riverside Park & Charge".into(),
            location: "Embankment Road".into(),
            charger_type: ChargerType::Standard,
            power_kw: 22,
            distance_km: 2.8,
            position: GeoPoint::new(51.5010, -0.1190),
        },
        Station {
            id: 3,
            name: "Harbour Front Hub".into(),
            location: "12 Quay Street, Docklands".into(),
            charger_type: ChargerType::Fast,
            power_kw: 120,
            distance_km: 4.5,
            position: GeoPoint::new(51.5055, -0.0235),
        },
        Station {
            id: 4,
            name: "Northgate Retail Park".into(),
            location: "Northgate Shopping Centre".into(),
            charger_type: ChargerType::Fast,
            power_kw: 50,
            distance_km: 6.1,
            position: GeoPoint::new(51.5560, -0.1080),
        },
        Station {
            id: 5,
            name: "Airport Long Stay".into(),
            location: "Terminal 2 Car Park".into(),
            charger_type: ChargerType::Standard,
            power_kw: 11,
            distance_km: 18.4,
            position: GeoPoint::new(51.4700, -0.4543),
        },
        Station {
            id: 6,
            name: "Motorway Services East".into(),
            location: "M11 Junction 7".into(),
            charger_type: ChargerType::Rapid,
            power_kw: 350,
            distance_km: 24.0,
            position: GeoPoint::new(51.7300, 0.1200),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_is_case_insensitive_on_name_and_location() {
        let stations = demo_stations();
        let harbour = &stations[2];
        assert!(harbour.matches_search("HARBOUR"));
        assert!(harbour.matches_search("docklands"));
        assert!(harbour.matches_search(""));
        assert!(!harbour.matches_search("airport"));
    }

    #[test]
    fn charger_type_parsing() {
        assert_eq!(ChargerType::from_str(" Fast "), Some(ChargerType::Fast));
        assert_eq!(ChargerType::from_str("turbo"), None);
    }

    #[test]
    fn demo_ids_are_unique() {
        let mut ids: Vec<u32> = demo_stations().iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), demo_stations().len());
    }
}
