//! Booking aggregate
//!
//! Contains the Booking entity, its status lifecycle and the arrival
//! refund policy.

pub mod model;
pub mod refund;

pub use model::{Booking, BookingPatch, BookingStats, BookingStatus, NewBooking};
pub use refund::{RefundPolicy, RefundTier};
