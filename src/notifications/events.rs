//! Notification events
//!
//! Everything the booking flow and the ledger report to the embedding UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BookingStatus, RefundTier};

/// Event types for notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A slot was picked in the booking dialog
    SlotSelected(SlotSelectedEvent),
    /// The driver confirmed the chosen slot
    BookingConfirmed(BookingConfirmedEvent),
    /// The simulated payment finished; the embedding context should persist it
    PaymentProcessed(BookingConfirmedEvent),
    /// The booked slot started; the arrival countdown is running
    CountdownStarted(CountdownStartedEvent),
    /// Remaining arrival time after a tick
    CountdownTick(CountdownTickEvent),
    /// The arrival window ran out; the flow was force-closed
    ArrivalWindowExpired(FlowResolvedEvent),
    /// The driver checked in; refund tier decided
    BookingResolved(FlowResolvedEvent),
    /// The flow was closed or cancelled by the driver
    FlowClosed(FlowClosedEvent),
    /// Ledger record created
    BookingCreated(LedgerChangeEvent),
    /// Ledger record changed
    BookingUpdated(LedgerChangeEvent),
    /// Ledger record deleted
    BookingRemoved(LedgerChangeEvent),
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::SlotSelected(_) => "slot_selected",
            Event::BookingConfirmed(_) => "booking_confirmed",
            Event::PaymentProcessed(_) => "payment_processed",
            Event::CountdownStarted(_) => "countdown_started",
            Event::CountdownTick(_) => "countdown_tick",
            Event::ArrivalWindowExpired(_) => "arrival_window_expired",
            Event::BookingResolved(_) => "booking_resolved",
            Event::FlowClosed(_) => "flow_closed",
            Event::BookingCreated(_) => "booking_created",
            Event::BookingUpdated(_) => "booking_updated",
            Event::BookingRemoved(_) => "booking_removed",
        }
    }

    /// Get the station ID the event concerns
    pub fn station_id(&self) -> u32 {
        match self {
            Event::SlotSelected(e) => e.station_id,
            Event::BookingConfirmed(e) | Event::PaymentProcessed(e) => e.station_id,
            Event::CountdownStarted(e) => e.station_id,
            Event::CountdownTick(e) => e.station_id,
            Event::ArrivalWindowExpired(e) | Event::BookingResolved(e) => e.station_id,
            Event::FlowClosed(e) => e.station_id,
            Event::BookingCreated(e) | Event::BookingUpdated(e) | Event::BookingRemoved(e) => {
                e.station_id
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSelectedEvent {
    pub station_id: u32,
    pub slot_start: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingConfirmedEvent {
    pub station_id: u32,
    pub station_name: String,
    pub station_location: String,
    pub booked_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownStartedEvent {
    pub station_id: u32,
    pub booked_time: DateTime<Utc>,
    pub arrival_window_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownTickEvent {
    pub station_id: u32,
    pub remaining_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResolvedEvent {
    pub station_id: u32,
    pub booked_time: DateTime<Utc>,
    /// Arrival offset from the booked instant, in simulated seconds
    pub elapsed_secs: i64,
    pub refund: RefundTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowClosedEvent {
    pub station_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerChangeEvent {
    pub booking_id: String,
    pub station_id: u32,
    pub status: BookingStatus,
}

/// Event envelope delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
