pub mod clock;
pub mod errors;
pub mod shutdown;

pub use clock::{Clock, ClockTick, ManualClock, SimulationClock, SystemClock};
pub use errors::*;
pub use shutdown::{listen_for_shutdown_signals, ShutdownSignal};
