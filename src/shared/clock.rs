//! Time sources
//!
//! Everything time-dependent in the crate reads "now" through [`Clock`] so
//! that the booking flow and the cache can run on simulated time.
//! [`SimulationClock`] additionally fans out ordered ticks to subscribers.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the tick channel. A subscriber that falls further behind
/// than this observes a `Lagged` error and skips ahead.
const TICK_CHANNEL_CAPACITY: usize = 256;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One step of simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    /// Simulated instant after the step.
    pub now: DateTime<Utc>,
    /// Speed multiplier in effect for the step.
    pub speed: f64,
    /// Wall-clock length of the step.
    pub interval: Duration,
}

impl ClockTick {
    /// Simulated time covered by this tick (`speed × interval`).
    pub fn simulated_elapsed(&self) -> Duration {
        scale(self.interval, self.speed)
    }
}

#[derive(Debug)]
struct SimulationState {
    now: DateTime<Utc>,
    speed: f64,
}

/// Accelerated clock. Each [`tick`](Self::tick) moves simulated time forward
/// by `speed × interval` and broadcasts the new instant, in order, to every
/// subscriber.
#[derive(Debug)]
pub struct SimulationClock {
    state: Mutex<SimulationState>,
    sender: broadcast::Sender<ClockTick>,
}

impl SimulationClock {
    pub fn new(start: DateTime<Utc>, speed: f64) -> Self {
        let (sender, _) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(SimulationState {
                now: start,
                speed: sanitize_speed(speed),
            }),
            sender,
        }
    }

    pub fn speed(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .speed
    }

    pub fn set_speed(&self, speed: f64) {
        let speed = sanitize_speed(speed);
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .speed = speed;
        debug!(speed, "Simulation speed changed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClockTick> {
        self.sender.subscribe()
    }

    /// Advance by one wall-clock `interval` at the current speed.
    pub fn tick(&self, interval: Duration) -> ClockTick {
        let tick = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let step = scale(interval, state.speed);
            state.now += step;
            ClockTick {
                now: state.now,
                speed: state.speed,
                interval,
            }
        };
        // No subscribers is fine: nothing is listening for ticks yet.
        let _ = self.sender.send(tick);
        tick
    }

    /// Jump simulated time forward without changing the speed.
    pub fn jump(&self, by: Duration) -> ClockTick {
        let tick = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.now += by;
            ClockTick {
                now: state.now,
                speed: state.speed,
                interval: Duration::zero(),
            }
        };
        let _ = self.sender.send(tick);
        tick
    }
}

impl Clock for SimulationClock {
    fn now(&self) -> DateTime<Utc> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .now
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

/// Multiply a duration by a float factor with millisecond precision.
pub(crate) fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::milliseconds((duration.num_milliseconds() as f64 * factor).round() as i64)
}
