//! Booking flow and booking ledger

pub mod ledger;
pub mod lifecycle;
pub mod session;

pub use ledger::{BookingLedger, LedgerSettings, LEDGER_KEY};
pub use lifecycle::{BookingLifecycleController, BookingTarget, FlowState, LifecycleConfig};
pub use session::BookingFlowSession;
