//! # EV Booking Core
//!
//! Station discovery, slot booking and occupancy prediction for an EV
//! charging app, driven by a simulated clock.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Bookings, time slots, stations, refund policy, predictions
//! - **application**: Booking lifecycle and its async session, booking
//!   ledger, occupancy predictor, station ranking
//! - **infrastructure**: Two-tier persistent cache over a durable key-value store
//! - **notifications**: Event bus for booking-flow and ledger events
//! - **shared**: Clocks, errors, shutdown signalling
//! - **app**: Composition root and tracing setup

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod notifications;
pub mod shared;

pub use app::{init_tracing, AppServices};
pub use config::{default_config_path, AppConfig};

// Re-export notifications
pub use notifications::{create_event_bus, Event, EventBus, SharedEventBus};
