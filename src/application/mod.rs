//! Application layer - booking flow, ledger, prediction and ranking

pub mod booking;
pub mod prediction;
pub mod ranking;

pub use booking::{
    BookingFlowSession, BookingLedger, BookingLifecycleController, BookingTarget, FlowState,
    LedgerSettings, LifecycleConfig,
};
pub use prediction::OccupancyPredictor;
pub use ranking::{RankedStation, StationFilter, StationRankingService};
