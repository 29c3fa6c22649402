//! Synthetic occupancy predictor
//!
//! Usage = base occupancy × location multiplier × time-of-day multiplier
//! × weekend factor × random jitter, clamped to `[0, 1]`. Randomness comes
//! from an injected [`StdRng`]; seed it for reproducible output.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::PredictorConfig;
use crate::domain::{HourlyForecast, OccupancyPrediction, StationPattern};

const MORNING_PEAKS: [u32; 3] = [7, 8, 9];
const EVENING_PEAKS: [u32; 3] = [17, 18, 19];

pub struct OccupancyPredictor {
    config: PredictorConfig,
    patterns: HashMap<u32, StationPattern>,
    rng: Mutex<StdRng>,
}

impl OccupancyPredictor {
    /// Patterns are generated once for `station_ids`; other ids get a
    /// randomized default. Uses `config.seed` when set, OS entropy
    /// otherwise.
    pub fn new(config: PredictorConfig, station_ids: impl IntoIterator<Item = u32>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, station_ids, rng)
    }

    pub fn with_seed(seed: u64, station_ids: impl IntoIterator<Item = u32>) -> Self {
        Self::with_rng(
            PredictorConfig::default(),
            station_ids,
            StdRng::seed_from_u64(seed),
        )
    }

    pub fn from_entropy(station_ids: impl IntoIterator<Item = u32>) -> Self {
        Self::with_rng(PredictorConfig::default(), station_ids, StdRng::from_entropy())
    }

    fn with_rng(
        mut config: PredictorConfig,
        station_ids: impl IntoIterator<Item = u32>,
        mut rng: StdRng,
    ) -> Self {
        // An inverted range would make `gen_range` panic
        if config.jitter_min > config.jitter_max {
            std::mem::swap(&mut config.jitter_min, &mut config.jitter_max);
        }
        let patterns: HashMap<u32, StationPattern> = station_ids
            .into_iter()
            .map(|id| (id, generate_pattern(&mut rng)))
            .collect();
        debug!(stations = patterns.len(), "Occupancy patterns generated");
        Self {
            config,
            patterns,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn pattern(&self, station_id: u32) -> Option<&StationPattern> {
        self.patterns.get(&station_id)
    }

    pub fn predict(&self, station_id: u32, now: DateTime<Utc>) -> OccupancyPrediction {
        let mut rng = self.rng();
        match self.patterns.get(&station_id) {
            Some(pattern) => self.predict_with(pattern, now, &mut rng),
            None => self.default_prediction(&mut rng),
        }
    }

    /// Predictions for `hours` consecutive full hours starting with the
    /// hour containing `from`.
    pub fn forecast(&self, station_id: u32, from: DateTime<Utc>, hours: u32) -> Vec<HourlyForecast> {
        let start = from.duration_trunc(Duration::hours(1)).unwrap_or(from);
        (0..hours)
            .map(|offset| {
                let hour = start + Duration::hours(offset as i64);
                HourlyForecast {
                    hour,
                    prediction: self.predict(station_id, hour),
                }
            })
            .collect()
    }

    /// The hour in the next `hours` with the lowest predicted usage.
    pub fn best_time_to_visit(
        &self,
        station_id: u32,
        now: DateTime<Utc>,
        hours: u32,
    ) -> Option<HourlyForecast> {
        self.forecast(station_id, now, hours)
            .into_iter()
            .min_by(|a, b| {
                a.prediction
                    .predicted_usage
                    .total_cmp(&b.prediction.predicted_usage)
            })
    }

    fn predict_with(
        &self,
        pattern: &StationPattern,
        now: DateTime<Utc>,
        rng: &mut StdRng,
    ) -> OccupancyPrediction {
        let jitter = rng.gen_range(self.config.jitter_min..=self.config.jitter_max);
        let usage = (pattern.base_occupancy
            * pattern.location_multiplier
            * self.time_multiplier(pattern, now)
            * self.weekend_factor(now)
            * jitter)
            .clamp(0.0, 1.0);

        let availability = available_points(usage, pattern.capacity);
        OccupancyPrediction {
            predicted_usage: usage,
            confidence: rng.gen_range(0.7..=0.95),
            availability,
            wait_time: wait_minutes(availability, rng),
            status: self.config.thresholds.classify(usage),
        }
    }

    /// Unknown station: no pattern, so usage is a plain random draw.
    fn default_prediction(&self, rng: &mut StdRng) -> OccupancyPrediction {
        let usage: f64 = rng.gen_range(0.0..=1.0);
        let availability = available_points(usage, self.config.unknown_station_capacity);
        OccupancyPrediction {
            predicted_usage: usage,
            confidence: rng.gen_range(0.3..=0.5),
            availability,
            wait_time: wait_minutes(availability, rng),
            status: self.config.thresholds.classify(usage),
        }
    }

    /// Peak hours take precedence over the late-night and midday bands.
    fn time_multiplier(&self, pattern: &StationPattern, now: DateTime<Utc>) -> f64 {
        let hour = now.hour();
        if pattern.is_peak(hour) {
            self.config.peak_multiplier
        } else if hour >= 22 || hour < 6 {
            self.config.late_night_multiplier
        } else if (12..15).contains(&hour) {
            self.config.midday_multiplier
        } else {
            1.0
        }
    }

    fn weekend_factor(&self, now: DateTime<Utc>) -> f64 {
        match now.weekday() {
            Weekday::Sat | Weekday::Sun => self.config.weekend_factor,
            _ => 1.0,
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn generate_pattern(rng: &mut StdRng) -> StationPattern {
    let mut peak_hours = BTreeSet::new();
    // Commuter peaks, each hour kept with some probability
    for hour in MORNING_PEAKS.iter().chain(EVENING_PEAKS.iter()) {
        if rng.gen_bool(0.7) {
            peak_hours.insert(*hour);
        }
    }
    StationPattern {
        peak_hours,
        base_occupancy: rng.gen_range(0.3..=0.7),
        location_multiplier: rng.gen_range(0.8..=1.3),
        capacity: rng.gen_range(4..=12),
    }
}

fn available_points(usage: f64, capacity: u32) -> u32 {
    let occupied = (usage * capacity as f64).floor() as u32;
    capacity.saturating_sub(occupied)
}

fn wait_minutes(availability: u32, rng: &mut StdRng) -> u32 {
    if availability == 0 {
        rng.gen_range(15..=35)
    } else {
        rng.gen_range(0..=5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OccupancyStatus;
    use chrono::TimeZone;

    // 2026-03-02 is a Monday
    fn weekday_at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn fixed_pattern(peak_hours: &[u32]) -> StationPattern {
        StationPattern {
            peak_hours: peak_hours.iter().copied().collect(),
            base_occupancy: 0.5,
            location_multiplier: 1.0,
            capacity: 10,
        }
    }

    #[test]
    fn unknown_station_prediction_is_bounded() {
        let predictor = OccupancyPredictor::with_seed(7, [1, 2, 3]);
        for hour in 0..24 {
            let p = predictor.predict(999, weekday_at(hour));
            assert!(p.availability <= 8);
            assert!((0.0..=1.0).contains(&p.predicted_usage));
            assert!((0.0..=1.0).contains(&p.confidence));
            assert_eq!(p.status, predictor.config().thresholds.classify(p.predicted_usage));
        }
    }

    #[test]
    fn known_station_prediction_is_consistent() {
        let predictor = OccupancyPredictor::with_seed(11, [1, 2, 3]);
        let capacity = predictor.pattern(2).unwrap().capacity;
        for hour in 0..24 {
            let p = predictor.predict(2, weekday_at(hour));
            assert!((0.0..=1.0).contains(&p.predicted_usage));
            assert!(p.availability <= capacity);
            assert_eq!(
                p.availability,
                capacity - (p.predicted_usage * capacity as f64).floor() as u32
            );
            if p.availability == 0 {
                assert!((15..=35).contains(&p.wait_time));
            } else {
                assert!(p.wait_time <= 5);
            }
        }
    }

    #[test]
    fn same_seed_same_predictions() {
        let a = OccupancyPredictor::with_seed(42, [1, 2]);
        let b = OccupancyPredictor::with_seed(42, [1, 2]);
        assert_eq!(a.pattern(1), b.pattern(1));
        assert_eq!(a.predict(1, weekday_at(8)), b.predict(1, weekday_at(8)));
        assert_eq!(a.predict(5, weekday_at(8)), b.predict(5, weekday_at(8)));
    }

    #[test]
    fn generated_patterns_within_ranges() {
        let predictor = OccupancyPredictor::with_seed(3, 1..=20);
        for id in 1..=20 {
            let pattern = predictor.pattern(id).unwrap();
            assert!((4..=12).contains(&pattern.capacity));
            assert!((0.3..=0.7).contains(&pattern.base_occupancy));
            assert!(pattern
                .peak_hours
                .iter()
                .all(|h| MORNING_PEAKS.contains(h) || EVENING_PEAKS.contains(h)));
        }
        assert!(predictor.pattern(21).is_none());
    }

    #[test]
    fn time_multiplier_bands() {
        let predictor = OccupancyPredictor::with_seed(1, std::iter::empty());
        let pattern = fixed_pattern(&[8, 13, 23]);

        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(8)), 1.6);
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(2)), 0.3);
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(22)), 0.3);
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(12)), 1.2);
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(10)), 1.0);
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(6)), 1.0);
        // Peak wins over midday and late night
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(13)), 1.6);
        assert_eq!(predictor.time_multiplier(&pattern, weekday_at(23)), 1.6);
    }

    #[test]
    fn weekend_dampening() {
        let predictor = OccupancyPredictor::with_seed(1, std::iter::empty());
        let saturday = Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap();
        assert_eq!(predictor.weekend_factor(saturday), 0.7);
        assert_eq!(predictor.weekend_factor(weekday_at(10)), 1.0);
    }

    #[test]
    fn usage_is_clamped() {
        let predictor = OccupancyPredictor::with_seed(5, std::iter::empty());
        let mut pattern = fixed_pattern(&[8]);
        pattern.base_occupancy = 1.0;
        pattern.location_multiplier = 1.3;

        let mut rng = StdRng::seed_from_u64(5);
        let p = predictor.predict_with(&pattern, weekday_at(8), &mut rng);
        assert_eq!(p.predicted_usage, 1.0);
        assert_eq!(p.availability, 0);
        assert_eq!(p.status, OccupancyStatus::Full);
        assert!((15..=35).contains(&p.wait_time));
    }

    #[test]
    fn forecast_is_hourly_from_current_hour() {
        let predictor = OccupancyPredictor::with_seed(9, [1]);
        let from = Utc.with_ymd_and_hms(2026, 3, 2, 14, 25, 0).unwrap();
        let series = predictor.forecast(1, from, 6);

        assert_eq!(series.len(), 6);
        assert_eq!(series[0].hour, weekday_at(14));
        assert_eq!(series[5].hour, weekday_at(19));
    }

    #[test]
    fn best_time_has_lowest_usage() {
        let predictor = OccupancyPredictor::with_seed(9, [1]);
        let best = predictor.best_time_to_visit(1, weekday_at(6), 12).unwrap();
        assert!((6..18).contains(&best.hour.hour()));
        assert!(predictor.best_time_to_visit(1, weekday_at(6), 0).is_none());
    }

    #[test]
    fn inverted_jitter_bounds_are_swapped() {
        let config = PredictorConfig {
            seed: Some(3),
            jitter_min: 1.2,
            jitter_max: 0.8,
            ..PredictorConfig::default()
        };
        let predictor = OccupancyPredictor::new(config, [1]);
        assert_eq!(predictor.config().jitter_min, 0.8);
        assert_eq!(predictor.config().jitter_max, 1.2);

        let p = predictor.predict(1, weekday_at(12));
        assert!((0.0..=1.0).contains(&p.predicted_usage));
    }
}
