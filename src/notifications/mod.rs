//! Booking notifications
//!
//! Broadcasts booking-flow and ledger events to whoever embeds the core
//! (UI, CLI).

pub mod event_bus;
pub mod events;

pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use events::{
    BookingConfirmedEvent, CountdownStartedEvent, CountdownTickEvent, Event, EventMessage,
    FlowClosedEvent, FlowResolvedEvent, LedgerChangeEvent, SlotSelectedEvent,
};
