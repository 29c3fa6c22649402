//! In-process event bus
//!
//! Booking-flow and ledger events fan out to every subscriber over one
//! tokio broadcast channel. A subscriber may be scoped to a single
//! station, in which case events for other stations are skipped on
//! receive. Subscribers that fall behind lose the oldest events; the loss
//! is logged and counted.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use super::events::{Event, EventMessage};

/// Events buffered per subscriber before the oldest are dropped
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscribers: Arc<AtomicUsize>,
    missed: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscribers: Arc::new(AtomicUsize::new(0)),
            missed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wrap `event` in an envelope and fan it out. Publishing with nobody
    /// listening is not an error.
    pub fn publish(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let station_id = message.event.station_id();

        let delivered = self.sender.send(message).unwrap_or(0);
        debug!(event_type, station_id, delivered, "Event published");
    }

    /// Receive every event.
    pub fn subscribe(&self) -> EventSubscriber {
        self.attach(None)
    }

    /// Receive only events concerning `station_id`.
    pub fn subscribe_station(&self, station_id: u32) -> EventSubscriber {
        self.attach(Some(station_id))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Events lost by lagging subscribers since the bus was created.
    pub fn missed_events(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    fn attach(&self, station_id: Option<u32>) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        let subscribers = self.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(subscribers, station_id, "Event subscriber attached");

        EventSubscriber {
            receiver,
            station_id,
            subscribers: self.subscribers.clone(),
            missed: self.missed.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    station_id: Option<u32>,
    subscribers: Arc<AtomicUsize>,
    missed: Arc<AtomicU64>,
}

impl EventSubscriber {
    /// Next event in scope, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) if self.in_scope(&msg) => return Some(msg),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event in scope, without waiting.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) if self.in_scope(&msg) => return Some(msg),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn station_id(&self) -> Option<u32> {
        self.station_id
    }

    fn in_scope(&self, msg: &EventMessage) -> bool {
        self.station_id
            .map_or(true, |id| msg.event.station_id() == id)
    }

    fn record_lag(&self, skipped: u64) {
        self.missed.fetch_add(skipped, Ordering::Relaxed);
        metrics::counter!("event_bus_missed_total").increment(skipped);
        warn!(skipped, station_id = self.station_id, "Event subscriber lagged");
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let previous = self.subscribers.fetch_sub(1, Ordering::SeqCst);
        debug!(
            subscribers = previous.saturating_sub(1),
            station_id = self.station_id,
            "Event subscriber detached"
        );
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
