pub mod booking;
pub mod prediction;
pub mod route;
pub mod station;
pub mod time_slot;

// Re-export commonly used types
pub use booking::{
    Booking, BookingPatch, BookingStats, BookingStatus, NewBooking, RefundPolicy, RefundTier,
};
pub use prediction::{HourlyForecast, OccupancyPrediction, OccupancyStatus, StatusThresholds};
pub use route::{MapMarker, RouteOverlay};
pub use station::{demo_stations, ChargerType, GeoPoint, Station, StationPattern};
pub use time_slot::{generate_time_slots, TimeSlot, DEFAULT_SLOT_COUNT};

pub use crate::shared::errors::{DomainError, DomainResult};
