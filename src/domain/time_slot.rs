//! Bookable hour slots

use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Number of slots offered when the caller does not ask for a specific count.
pub const DEFAULT_SLOT_COUNT: usize = 12;

/// A one-hour window that can be booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Derived from the start instant
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeSlot {
    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            id: start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            start_time,
            end_time: start_time + Duration::hours(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_time <= instant && instant < self.end_time
    }
}

/// Generate `count` consecutive hour slots, the first one starting at the
/// next full hour strictly after `now`.
///
/// `now` exactly on the hour still yields `now + 1h` as the first start.
pub fn generate_time_slots(now: DateTime<Utc>, count: usize) -> Vec<TimeSlot> {
    let first = next_hour_boundary(now);
    (0..count)
        .map(|i| TimeSlot::starting_at(first + Duration::hours(i as i64)))
        .collect()
}

fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    // Truncation only fails for instants at the edge of chrono's range.
    let floor = now
        .duration_trunc(Duration::hours(1))
        .unwrap_or_else(|_| now - Duration::nanoseconds(now.timestamp_subsec_nanos() as i64));
    floor + Duration::hours(1)
}
