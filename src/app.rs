//! Composition root
//!
//! Wires the cache, ledger, predictor, simulation clock and event bus from
//! an [`AppConfig`], and hosts the glue that turns booking-flow events into
//! ledger records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::booking::{
    BookingFlowSession, BookingLedger, BookingLifecycleController, BookingTarget,
    LedgerSettings, LifecycleConfig,
};
use crate::application::prediction::OccupancyPredictor;
use crate::application::ranking::{RankedStation, StationFilter, StationRankingService};
use crate::config::AppConfig;
use crate::domain::{
    generate_time_slots, BookingPatch, BookingStatus, DomainError, DomainResult, NewBooking,
    Station, TimeSlot,
};
use crate::infrastructure::{
    CacheSettings, DurableStore, InMemoryStore, JsonFileStore, PersistentCache,
};
use crate::notifications::{create_event_bus, Event, SharedEventBus};
use crate::shared::clock::{Clock, SimulationClock};
use crate::shared::shutdown::ShutdownSignal;

/// Initialize tracing with an env-filter (`RUST_LOG` wins over the
/// configured level) and either human-readable or JSON output.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

pub struct AppServices {
    pub config: AppConfig,
    pub clock: Arc<SimulationClock>,
    pub events: SharedEventBus,
    pub cache: Arc<PersistentCache>,
    pub ledger: Arc<BookingLedger>,
    pub predictor: Arc<OccupancyPredictor>,
    pub stations: Vec<Station>,
}

impl AppServices {
    /// Build with the durable store the config asks for: a JSON file when
    /// persistence is enabled, a throwaway in-memory store otherwise.
    pub fn build(config: AppConfig, stations: Vec<Station>, start: DateTime<Utc>) -> Self {
        let durable: Arc<dyn DurableStore> = if config.storage.persistence_enabled {
            let path = config.storage.resolved_path();
            info!(path = %path.display(), "Using file-backed booking store");
            Arc::new(JsonFileStore::open(path))
        } else {
            Arc::new(InMemoryStore::new())
        };
        Self::with_store(config, stations, start, durable)
    }

    pub fn with_store(
        config: AppConfig,
        stations: Vec<Station>,
        start: DateTime<Utc>,
        durable: Arc<dyn DurableStore>,
    ) -> Self {
        let clock = Arc::new(SimulationClock::new(start, config.simulation.speed));
        let events = create_event_bus();

        let cache = Arc::new(PersistentCache::new(
            CacheSettings::from(&config),
            durable,
            clock.clone(),
        ));
        let ledger = Arc::new(
            BookingLedger::new(cache.clone(), clock.clone(), LedgerSettings::from(&config))
                .with_events(events.clone()),
        );
        let predictor = Arc::new(OccupancyPredictor::new(
            config.predictor.clone(),
            stations.iter().map(|s| s.id),
        ));

        info!(
            stations = stations.len(),
            persistence = cache.persistence_enabled(),
            speed = config.simulation.speed,
            "Booking services ready"
        );
        Self {
            config,
            clock,
            events,
            cache,
            ledger,
            predictor,
            stations,
        }
    }

    pub fn station(&self, station_id: u32) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == station_id)
    }

    /// Bookable slots from the current simulated instant.
    pub fn time_slots(&self) -> Vec<TimeSlot> {
        generate_time_slots(self.clock.now(), self.config.booking.slot_count)
    }

    pub fn ranked_stations(&self, filter: &StationFilter, search_term: &str) -> Vec<RankedStation> {
        StationRankingService::filter_and_sort(
            &self.stations,
            filter,
            search_term,
            &self.predictor,
            self.clock.now(),
        )
    }

    /// Open the booking dialog for a station. Must be called from within
    /// a tokio runtime.
    pub fn open_booking_flow(&self, station_id: u32) -> DomainResult<BookingFlowSession> {
        let station = self.station(station_id).ok_or_else(|| DomainError::NotFound {
            entity: "Station",
            field: "id",
            value: station_id.to_string(),
        })?;
        if self.ledger.is_station_booked(station_id) {
            return Err(DomainError::Validation(format!(
                "station {station_id} already has a live booking"
            )));
        }

        let controller = BookingLifecycleController::new(
            BookingTarget::from(station),
            LifecycleConfig::from(&self.config),
        );
        Ok(BookingFlowSession::open(
            controller,
            &self.clock,
            self.events.clone(),
        ))
    }

    /// Record paid bookings in the ledger and close them out when the flow
    /// resolves. Runs until `shutdown` fires or the bus closes.
    pub fn spawn_ledger_writer(&self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let mut subscriber = self.events.subscribe();
        let ledger = self.ledger.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = subscriber.recv() => {
                        match msg {
                            Some(msg) => record_flow_event(&ledger, &msg.event),
                            None => break,
                        }
                    }
                    _ = shutdown.wait() => {
                        debug!("Ledger writer shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Apply one booking-flow event to the ledger: a paid confirmation
/// becomes a booking, a resolved flow completes or expires it.
pub fn record_flow_event(ledger: &BookingLedger, event: &Event) {
    match event {
        Event::PaymentProcessed(paid) => {
            ledger.add_booking(NewBooking {
                station_id: paid.station_id,
                station_name: paid.station_name.clone(),
                station_location: paid.station_location.clone(),
                booked_time: paid.booked_time,
                expiry_time: None,
            });
        }
        Event::BookingResolved(resolved) => {
            close_live_booking(ledger, resolved.station_id, BookingStatus::Completed);
        }
        Event::ArrivalWindowExpired(expired) => {
            close_live_booking(ledger, expired.station_id, BookingStatus::Expired);
        }
        _ => {}
    }
}

fn close_live_booking(ledger: &BookingLedger, station_id: u32, status: BookingStatus) {
    match ledger.get_live_booking_for_station(station_id) {
        Some(booking) => {
            ledger.update_booking(&booking.id, BookingPatch::status(status));
        }
        None => {
            warn!(station_id, status = status.as_str(), "No live booking to close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::demo_stations;
    use chrono::TimeZone;

    fn services() -> AppServices {
        let mut config = AppConfig::default();
        config.predictor.seed = Some(4);
        AppServices::build(
            config,
            demo_stations(),
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 5, 0).unwrap(),
        )
    }

    #[test]
    fn slots_follow_simulated_clock() {
        let app = services();
        let slots = app.time_slots();
        assert_eq!(slots.len(), 12);
        assert_eq!(
            slots[0].start_time,
            Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn ranked_stations_cover_listing() {
        let app = services();
        assert_eq!(app.ranked_stations(&StationFilter::All, "").len(), 6);
        assert!(!app.cache.persistence_enabled());
    }

    #[tokio::test]
    async fn unknown_station_cannot_be_booked() {
        let app = services();
        let err = app.open_booking_flow(99).err().unwrap();
        assert!(matches!(err, DomainError::NotFound { entity: "Station", .. }));
    }

    #[tokio::test]
    async fn booked_station_cannot_be_reopened() {
        let app = services();
        let slot = app.time_slots().remove(0);
        app.ledger.add_booking(NewBooking {
            station_id: 2,
            station_name: "Riverside".to_string(),
            station_location: "Embankment".to_string(),
            booked_time: slot.start_time,
            expiry_time: None,
        });
        assert!(matches!(
            app.open_booking_flow(2).err(),
            Some(DomainError::Validation(_))
        ));
        assert!(app.open_booking_flow(3).is_ok());
    }
}
