//! Booking lifecycle state machine
//!
//! `Selecting → Confirmed → CountingDown`, driven by explicit commands
//! (slot pick, confirm, arrival, close) and by clock ticks. Every
//! resolution (expiry, arrival, close) returns the flow to `Selecting`.
//!
//! The controller is synchronous and owns no timers; see
//! [`BookingFlowSession`](super::session::BookingFlowSession) for the
//! async driver.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::{DomainError, DomainResult, RefundPolicy, RefundTier, Station, TimeSlot};
use crate::notifications::{
    BookingConfirmedEvent, CountdownStartedEvent, CountdownTickEvent, Event, FlowClosedEvent,
    FlowResolvedEvent, SlotSelectedEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Selecting,
    Confirmed,
    CountingDown,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Selecting => "selecting",
            FlowState::Confirmed => "confirmed",
            FlowState::CountingDown => "counting_down",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Simulated time the driver has to arrive once the slot starts
    pub arrival_window: Duration,
    /// Wall-clock length of one clock tick
    pub tick_interval: Duration,
    /// Wall-clock delay before the confirmation is reported as paid
    pub payment_delay: Duration,
    pub refund_policy: RefundPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            arrival_window: Duration::minutes(10),
            tick_interval: Duration::seconds(1),
            payment_delay: Duration::seconds(2),
            refund_policy: RefundPolicy::standard(),
        }
    }
}

impl From<&AppConfig> for LifecycleConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            arrival_window: Duration::seconds(cfg.booking.arrival_window_secs as i64),
            tick_interval: cfg.simulation.tick_interval(),
            payment_delay: Duration::milliseconds(cfg.booking.payment_delay_ms as i64),
            refund_policy: cfg.booking.refund.policy(),
        }
    }
}

/// Station the flow books against
#[derive(Debug, Clone, PartialEq)]
pub struct BookingTarget {
    pub station_id: u32,
    pub station_name: String,
    pub station_location: String,
}

impl From<&Station> for BookingTarget {
    fn from(station: &Station) -> Self {
        Self {
            station_id: station.id,
            station_name: station.name.clone(),
            station_location: station.location.clone(),
        }
    }
}

pub struct BookingLifecycleController {
    target: BookingTarget,
    config: LifecycleConfig,
    state: FlowState,
    selected_slot: Option<TimeSlot>,
    /// Simulated seconds left in the arrival window
    remaining_secs: f64,
}

impl BookingLifecycleController {
    pub fn new(target: BookingTarget, config: LifecycleConfig) -> Self {
        let remaining_secs = seconds(config.arrival_window);
        Self {
            target,
            config,
            state: FlowState::Selecting,
            selected_slot: None,
            remaining_secs,
        }
    }

    pub fn target(&self) -> &BookingTarget {
        &self.target
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn selected_slot(&self) -> Option<&TimeSlot> {
        self.selected_slot.as_ref()
    }

    pub fn remaining_seconds(&self) -> f64 {
        self.remaining_secs
    }

    /// Choose (or re-choose) the slot to book.
    pub fn select_slot(&mut self, slot: TimeSlot) -> DomainResult<SlotSelectedEvent> {
        self.require(FlowState::Selecting, "select a slot")?;

        debug!(
            station_id = self.target.station_id,
            slot = %slot.id,
            "Slot selected"
        );
        let event = SlotSelectedEvent {
            station_id: self.target.station_id,
            slot_start: slot.start_time,
        };
        self.selected_slot = Some(slot);
        Ok(event)
    }

    /// Confirm the selected slot. The state changes immediately; payment
    /// reporting is left to the caller.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<BookingConfirmedEvent> {
        self.require(FlowState::Selecting, "confirm")?;
        let slot = self.selected_slot.as_ref().ok_or(DomainError::InvalidTransition {
            state: "selecting without a slot",
            action: "confirm",
        })?;

        let event = BookingConfirmedEvent {
            station_id: self.target.station_id,
            station_name: self.target.station_name.clone(),
            station_location: self.target.station_location.clone(),
            booked_time: slot.start_time,
        };
        self.state = FlowState::Confirmed;

        info!(
            station_id = self.target.station_id,
            booked_time = %event.booked_time,
            confirmed_at = %now,
            "Booking confirmed"
        );
        Ok(event)
    }

    /// Apply one clock tick. The `Confirmed → CountingDown` tick does not
    /// consume any of the arrival window.
    pub fn tick(&mut self, now: DateTime<Utc>, speed: f64) -> Vec<Event> {
        let Some(slot) = self.selected_slot.as_ref() else {
            return Vec::new();
        };
        let station_id = self.target.station_id;

        match self.state {
            FlowState::Selecting => Vec::new(),
            FlowState::Confirmed => {
                if now < slot.start_time {
                    return Vec::new();
                }
                self.state = FlowState::CountingDown;
                self.remaining_secs = seconds(self.config.arrival_window);
                info!(station_id, remaining = self.remaining_secs, "Arrival countdown started");
                vec![Event::CountdownStarted(CountdownStartedEvent {
                    station_id,
                    booked_time: slot.start_time,
                    arrival_window_secs: self.remaining_secs,
                })]
            }
            FlowState::CountingDown => {
                self.remaining_secs -= speed * seconds(self.config.tick_interval);
                if self.remaining_secs > 0.0 {
                    return vec![Event::CountdownTick(CountdownTickEvent {
                        station_id,
                        remaining_secs: self.remaining_secs,
                    })];
                }

                let event = FlowResolvedEvent {
                    station_id,
                    booked_time: slot.start_time,
                    elapsed_secs: (now - slot.start_time).num_seconds().max(0),
                    refund: RefundTier::None,
                };
                info!(station_id, "Arrival window expired, no refund");
                metrics::counter!(
                    "booking_flow_resolutions_total",
                    "outcome" => "expired",
                    "refund" => "none"
                )
                .increment(1);
                self.reset();
                vec![Event::ArrivalWindowExpired(event)]
            }
        }
    }

    /// Driver checked in at `now`; decide the refund tier and reset.
    pub fn record_arrival(&mut self, now: DateTime<Utc>) -> DomainResult<FlowResolvedEvent> {
        if self.state == FlowState::Selecting {
            return Err(self.invalid("record an arrival"));
        }
        let slot = self
            .selected_slot
            .as_ref()
            .ok_or_else(|| self.invalid("record an arrival"))?;

        let elapsed = (now - slot.start_time).max(Duration::zero());
        let refund = self.config.refund_policy.tier_for(elapsed);
        let event = FlowResolvedEvent {
            station_id: self.target.station_id,
            booked_time: slot.start_time,
            elapsed_secs: elapsed.num_seconds(),
            refund,
        };

        info!(
            station_id = self.target.station_id,
            elapsed_secs = event.elapsed_secs,
            refund = refund.as_str(),
            "Arrival recorded"
        );
        metrics::counter!(
            "booking_flow_resolutions_total",
            "outcome" => "arrived",
            "refund" => refund.as_str()
        )
        .increment(1);
        self.reset();
        Ok(event)
    }

    /// Close or cancel from any state.
    pub fn close(&mut self) -> FlowClosedEvent {
        debug!(station_id = self.target.station_id, state = self.state.as_str(), "Flow closed");
        self.reset();
        FlowClosedEvent {
            station_id: self.target.station_id,
        }
    }

    fn reset(&mut self) {
        self.state = FlowState::Selecting;
        self.selected_slot = None;
        self.remaining_secs = seconds(self.config.arrival_window);
    }

    fn require(&self, expected: FlowState, action: &'static str) -> DomainResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidTransition {
            state: self.state.as_str(),
            action,
        }
    }
}

fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}
