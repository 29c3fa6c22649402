//! Station list filtering and ranking

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::prediction::OccupancyPredictor;
use crate::domain::{ChargerType, MapMarker, OccupancyPrediction, Station};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StationFilter {
    #[default]
    All,
    Type(ChargerType),
}

impl StationFilter {
    /// `"all"` or a charger type name; anything else is `None`.
    pub fn from_str(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        ChargerType::from_str(s).map(Self::Type)
    }

    pub fn matches(&self, station: &Station) -> bool {
        match self {
            Self::All => true,
            Self::Type(charger_type) => station.charger_type == *charger_type,
        }
    }
}

/// A station with the prediction it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStation {
    pub station: Station,
    pub prediction: OccupancyPrediction,
}

pub struct StationRankingService;

impl StationRankingService {
    /// Keep stations matching `filter` and `search_term`, predict each one
    /// once, and order best first.
    pub fn filter_and_sort(
        stations: &[Station],
        filter: &StationFilter,
        search_term: &str,
        predictor: &OccupancyPredictor,
        now: DateTime<Utc>,
    ) -> Vec<RankedStation> {
        let ranked = stations
            .iter()
            .filter(|s| filter.matches(s) && s.matches_search(search_term))
            .map(|s| RankedStation {
                station: s.clone(),
                prediction: predictor.predict(s.id, now),
            })
            .collect();
        Self::sort(ranked)
    }

    /// Stable sort: availability desc, then wait asc, then distance asc.
    pub fn sort(mut ranked: Vec<RankedStation>) -> Vec<RankedStation> {
        ranked.sort_by(compare);
        ranked
    }

    pub fn map_markers(ranked: &[RankedStation]) -> Vec<MapMarker> {
        ranked
            .iter()
            .map(|r| MapMarker::new(&r.station, &r.prediction))
            .collect()
    }
}

fn compare(a: &RankedStation, b: &RankedStation) -> Ordering {
    b.prediction
        .availability
        .cmp(&a.prediction.availability)
        .then_with(|| a.prediction.wait_time.cmp(&b.prediction.wait_time))
        .then_with(|| a.station.distance_km.total_cmp(&b.station.distance_km))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{demo_stations, OccupancyStatus};
    use chrono::TimeZone;

    fn ranked(id: u32, availability: u32, wait_time: u32, distance_km: f64) -> RankedStation {
        let mut station = demo_stations().remove(0);
        station.id = id;
        station.distance_km = distance_km;
        RankedStation {
            station,
            prediction: OccupancyPrediction {
                predicted_usage: 0.5,
                confidence: 0.8,
                availability,
                wait_time,
                status: OccupancyStatus::Moderate,
            },
        }
    }

    fn ids(ranked: &[RankedStation]) -> Vec<u32> {
        ranked.iter().map(|r| r.station.id).collect()
    }

    #[test]
    fn availability_ranks_first() {
        let sorted = StationRankingService::sort(vec![
            ranked(1, 2, 0, 1.0),
            ranked(2, 5, 4, 9.0),
        ]);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn wait_breaks_availability_tie() {
        let sorted = StationRankingService::sort(vec![
            ranked(1, 3, 5, 1.0),
            ranked(2, 3, 1, 9.0),
        ]);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn distance_breaks_remaining_tie() {
        let sorted = StationRankingService::sort(vec![
            ranked(1, 3, 2, 7.5),
            ranked(2, 3, 2, 2.0),
        ]);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let sorted = StationRankingService::sort(vec![
            ranked(3, 3, 2, 2.0),
            ranked(1, 3, 2, 2.0),
            ranked(2, 3, 2, 2.0),
        ]);
        assert_eq!(ids(&sorted), vec![3, 1, 2]);
    }

    #[test]
    fn filter_parsing() {
        assert_eq!(StationFilter::from_str("all"), Some(StationFilter::All));
        assert_eq!(
            StationFilter::from_str(" Rapid "),
            Some(StationFilter::Type(ChargerType::Rapid))
        );
        assert_eq!(StationFilter::from_str("hydrogen"), None);
    }

    #[test]
    fn filter_and_search_applied() {
        let stations = demo_stations();
        let predictor = OccupancyPredictor::with_seed(1, stations.iter().map(|s| s.id));
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();

        let fast = StationRankingService::filter_and_sort(
            &stations,
            &StationFilter::Type(ChargerType::Fast),
            "",
            &predictor,
            now,
        );
        assert_eq!(fast.len(), 2);
        assert!(fast.iter().all(|r| r.station.charger_type == ChargerType::Fast));

        let searched = StationRankingService::filter_and_sort(
            &stations,
            &StationFilter::All,
            "DOCKLANDS",
            &predictor,
            now,
        );
        assert_eq!(ids(&searched), vec![3]);

        let all = StationRankingService::filter_and_sort(
            &stations,
            &StationFilter::All,
            "",
            &predictor,
            now,
        );
        assert_eq!(all.len(), stations.len());
        for pair in all.windows(2) {
            assert_ne!(compare(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn markers_follow_ranking() {
        let sorted = StationRankingService::sort(vec![
            ranked(1, 1, 3, 1.0),
            ranked(2, 4, 0, 1.0),
        ]);
        let markers = StationRankingService::map_markers(&sorted);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].station_id, 2);
        assert_eq!(markers[0].availability, 4);
    }
}
