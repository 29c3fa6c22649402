//! Booking domain entity

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Paid for, slot not started yet
    Upcoming,
    /// Slot has started, driver expected on site
    Active,
    /// Arrival window passed without check-in
    Expired,
    /// Charging session finished
    Completed,
    /// Cancelled by the driver
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Upcoming and active bookings hold the station.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Upcoming | Self::Active)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reserved charging slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub station_id: u32,
    pub station_name: String,
    pub station_location: String,
    pub booked_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub expiry_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Create an upcoming booking with a freshly generated id.
    pub fn create(request: NewBooking, created_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_booking_id(created_at),
            station_id: request.station_id,
            station_name: request.station_name,
            station_location: request.station_location,
            booked_time: request.booked_time,
            status: BookingStatus::Upcoming,
            expiry_time: request.expiry_time,
            created_at,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Merge the fields present in `patch` into this booking.
    pub fn apply(&mut self, patch: BookingPatch) {
        if let Some(name) = patch.station_name {
            self.station_name = name;
        }
        if let Some(location) = patch.station_location {
            self.station_location = location;
        }
        if let Some(booked_time) = patch.booked_time {
            self.booked_time = booked_time;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(expiry_time) = patch.expiry_time {
            self.expiry_time = Some(expiry_time);
        }
    }
}

/// `booking_<created millis>_<9 random alphanumerics>`
fn generate_booking_id(created_at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("booking_{}_{}", created_at.timestamp_millis(), suffix)
}

/// Data needed to create a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub station_id: u32,
    pub station_name: String,
    pub station_location: String,
    pub booked_time: DateTime<Utc>,
    /// Filled from the ledger's configured expiry offset when absent
    pub expiry_time: Option<DateTime<Utc>>,
}

/// Partial update of a booking; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingPatch {
    pub station_name: Option<String>,
    pub station_location: Option<String>,
    pub booked_time: Option<DateTime<Utc>>,
    pub status: Option<BookingStatus>,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl BookingPatch {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Booking counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStats {
    pub total: usize,
    pub upcoming: usize,
    pub active: usize,
    pub expired: usize,
    pub completed: usize,
    pub cancelled: usize,
}

impl BookingStats {
    pub fn record(&mut self, status: BookingStatus) {
        self.total += 1;
        match status {
            BookingStatus::Upcoming => self.upcoming += 1,
            BookingStatus::Active => self.active += 1,
            BookingStatus::Expired => self.expired += 1,
            BookingStatus::Completed => self.completed += 1,
            BookingStatus::Cancelled => self.cancelled += 1,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_request() -> NewBooking {
        NewBooking {
            station_id: 3,
            station_name: "Harbour Front Hub".into(),
            station_location: "12 Quay Street".into(),
            booked_time: Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap(),
            expiry_time: None,
        }
    }

    #[test]
    fn new_booking_is_upcoming() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 14, 5, 0).unwrap();
        let b = Booking::create(sample_request(), created);
        assert_eq!(b.status, BookingStatus::Upcoming);
        assert!(b.is_live());
        assert!(b.id.starts_with(&format!("booking_{}_", created.timestamp_millis())));
        assert_eq!(b.id.rsplit('_').next().unwrap().len(), 9);
    }

    #[test]
    fn ids_are_unique() {
        let created = Utc::now();
        let a = Booking::create(sample_request(), created);
        let b = Booking::create(sample_request(), created);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut b = Booking::create(sample_request(), Utc::now());
        let expiry = b.booked_time + Duration::minutes(12);
        b.apply(BookingPatch {
            status: Some(BookingStatus::Active),
            expiry_time: Some(expiry),
            ..BookingPatch::default()
        });
        assert_eq!(b.status, BookingStatus::Active);
        assert_eq!(b.expiry_time, Some(expiry));
        assert_eq!(b.station_name, "Harbour Front Hub");
    }

    #[test]
    fn persisted_form_uses_strings_for_instants() {
        let b = Booking::create(sample_request(), Utc::now());
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["bookedTime"], "2024-06-01T15:00:00Z");
        assert_eq!(json["status"], "upcoming");

        let back: Booking = serde_json::from_value(json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn status_parsing() {
        assert_eq!(BookingStatus::from_str("active"), Some(BookingStatus::Active));
        assert_eq!(BookingStatus::from_str("Active"), None);
        assert!(!BookingStatus::Cancelled.is_live());
    }

    #[test]
    fn stats_bucket_by_status() {
        let mut stats = BookingStats::default();
        stats.record(BookingStatus::Upcoming);
        stats.record(BookingStatus::Upcoming);
        stats.record(BookingStatus::Expired);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.upcoming, 2);
        assert_eq!(stats.expired, 1);
    }
}
