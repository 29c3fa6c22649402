//! Booking ledger
//!
//! The set of all bookings, kept as one record in the persistent cache
//! under [`LEDGER_KEY`] with no TTL. Every mutation writes the full record
//! back. The in-process copy is reloaded from the cache once it is older
//! than the freshness window.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::domain::{Booking, BookingPatch, BookingStats, BookingStatus, NewBooking};
use crate::infrastructure::PersistentCache;
use crate::notifications::{Event, LedgerChangeEvent, SharedEventBus};
use crate::shared::clock::Clock;

pub const LEDGER_KEY: &str = "bookings_ledger";

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub freshness_window: Duration,
    /// Same-station requests whose booked instants are at most this far
    /// apart resolve to the existing booking
    pub dedup_window: Duration,
    /// Expiry offset from `booked_time` when the request carries none
    pub expiry_after: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            freshness_window: Duration::hours(24),
            dedup_window: Duration::seconds(60),
            expiry_after: Duration::minutes(12),
        }
    }
}

impl From<&AppConfig> for LedgerSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            freshness_window: Duration::hours(cfg.ledger.freshness_window_hours as i64),
            dedup_window: Duration::seconds(cfg.ledger.dedup_window_secs as i64),
            expiry_after: Duration::minutes(cfg.ledger.expiry_after_mins as i64),
        }
    }
}

/// Stored shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerRecord {
    bookings: HashMap<String, Booking>,
    last_updated: Option<DateTime<Utc>>,
}

struct Snapshot {
    record: LedgerRecord,
    loaded_at: DateTime<Utc>,
}

pub struct BookingLedger {
    cache: Arc<PersistentCache>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
    snapshot: RwLock<Snapshot>,
    events: Option<SharedEventBus>,
}

impl BookingLedger {
    pub fn new(cache: Arc<PersistentCache>, clock: Arc<dyn Clock>, settings: LedgerSettings) -> Self {
        let now = clock.now();
        let record = load_record(&cache);
        info!(bookings = record.bookings.len(), "Booking ledger loaded");
        Self {
            cache,
            clock,
            settings,
            snapshot: RwLock::new(Snapshot {
                record,
                loaded_at: now,
            }),
            events: None,
        }
    }

    /// Publish a ledger event for every mutation.
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Create a booking, or return the existing one for the same station
    /// booked within the dedup window.
    pub fn add_booking(&self, request: NewBooking) -> Booking {
        let now = self.clock.now();
        let booking = {
            let mut snapshot = self.write(now);
            let duplicate = snapshot.record.bookings.values().find(|b| {
                b.station_id == request.station_id
                    && (b.booked_time - request.booked_time).abs() <= self.settings.dedup_window
            });
            if let Some(existing) = duplicate {
                debug!(
                    booking_id = %existing.id,
                    station_id = existing.station_id,
                    "Duplicate booking request, returning existing"
                );
                return existing.clone();
            }

            let mut request = request;
            if request.expiry_time.is_none() {
                request.expiry_time = Some(request.booked_time + self.settings.expiry_after);
            }
            let booking = Booking::create(request, now);
            snapshot
                .record
                .bookings
                .insert(booking.id.clone(), booking.clone());
            self.persist(&mut snapshot, now);
            booking
        };

        info!(
            booking_id = %booking.id,
            station_id = booking.station_id,
            booked_time = %booking.booked_time,
            "Booking created"
        );
        metrics::counter!("bookings_created_total").increment(1);
        self.publish(Event::BookingCreated, &booking);
        booking
    }

    /// Merge `patch` into the booking; `None` when the id is unknown.
    pub fn update_booking(&self, id: &str, patch: BookingPatch) -> Option<Booking> {
        let now = self.clock.now();
        let updated = {
            let mut snapshot = self.write(now);
            let booking = snapshot.record.bookings.get_mut(id)?;
            booking.apply(patch);
            let updated = booking.clone();
            self.persist(&mut snapshot, now);
            updated
        };

        debug!(booking_id = id, status = updated.status.as_str(), "Booking updated");
        self.publish(Event::BookingUpdated, &updated);
        Some(updated)
    }

    pub fn cancel_booking(&self, id: &str) -> Option<Booking> {
        self.update_booking(id, BookingPatch::status(BookingStatus::Cancelled))
    }

    pub fn remove_booking(&self, id: &str) -> bool {
        let now = self.clock.now();
        let removed = {
            let mut snapshot = self.write(now);
            let removed = snapshot.record.bookings.remove(id);
            if removed.is_some() {
                self.persist(&mut snapshot, now);
            }
            removed
        };

        match removed {
            Some(booking) => {
                debug!(booking_id = id, "Booking removed");
                self.publish(Event::BookingRemoved, &booking);
                true
            }
            None => false,
        }
    }

    pub fn get_booking(&self, id: &str) -> Option<Booking> {
        self.read().record.bookings.get(id).cloned()
    }

    /// All bookings, newest `created_at` first.
    pub fn get_all_bookings(&self) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self.read().record.bookings.values().cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        bookings
    }

    pub fn get_bookings_for_station(&self, station_id: u32) -> Vec<Booking> {
        self.get_all_bookings()
            .into_iter()
            .filter(|b| b.station_id == station_id)
            .collect()
    }

    /// The upcoming or active booking of a station, if any.
    pub fn get_live_booking_for_station(&self, station_id: u32) -> Option<Booking> {
        self.get_bookings_for_station(station_id)
            .into_iter()
            .find(Booking::is_live)
    }

    pub fn is_station_booked(&self, station_id: u32) -> bool {
        self.read()
            .record
            .bookings
            .values()
            .any(|b| b.station_id == station_id && b.is_live())
    }

    pub fn get_stats(&self) -> BookingStats {
        let snapshot = self.read();
        let mut stats = BookingStats::default();
        for booking in snapshot.record.bookings.values() {
            stats.record(booking.status);
        }
        stats
    }

    /// Move bookings along with time: upcoming → active once the booked
    /// instant is reached, live → expired once past the expiry. Returns the
    /// bookings that changed.
    pub fn refresh_statuses(&self, now: DateTime<Utc>) -> Vec<Booking> {
        let changed: Vec<Booking> = {
            let mut snapshot = self.write(self.clock.now());
            let mut changed = Vec::new();
            for booking in snapshot.record.bookings.values_mut() {
                let next = match booking.status {
                    BookingStatus::Upcoming | BookingStatus::Active
                        if booking.expiry_time.is_some_and(|expiry| expiry < now) =>
                    {
                        BookingStatus::Expired
                    }
                    BookingStatus::Upcoming if booking.booked_time <= now => BookingStatus::Active,
                    _ => continue,
                };
                booking.status = next;
                changed.push(booking.clone());
            }
            if !changed.is_empty() {
                self.persist(&mut snapshot, self.clock.now());
            }
            changed
        };

        for booking in &changed {
            debug!(
                booking_id = %booking.id,
                status = booking.status.as_str(),
                "Booking status refreshed"
            );
            self.publish(Event::BookingUpdated, booking);
        }
        changed
    }

    pub fn clear_all_bookings(&self) {
        let now = self.clock.now();
        let mut snapshot = self.write(now);
        let count = snapshot.record.bookings.len();
        snapshot.record.bookings.clear();
        self.persist(&mut snapshot, now);
        info!(count, "All bookings cleared");
    }

    // ── Internals ──────────────────────────────────────────────

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.refresh_if_stale(self.clock.now());
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, now: DateTime<Utc>) -> RwLockWriteGuard<'_, Snapshot> {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        self.reload_if_stale(&mut snapshot, now);
        snapshot
    }

    fn refresh_if_stale(&self, now: DateTime<Utc>) {
        let stale = {
            let snapshot = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
            now - snapshot.loaded_at > self.settings.freshness_window
        };
        if stale {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            self.reload_if_stale(&mut snapshot, now);
        }
    }

    fn reload_if_stale(&self, snapshot: &mut Snapshot, now: DateTime<Utc>) {
        if now - snapshot.loaded_at <= self.settings.freshness_window {
            return;
        }
        match self.cache.get::<LedgerRecord>(LEDGER_KEY) {
            Some(record) => {
                debug!(bookings = record.bookings.len(), "Ledger reloaded from cache");
                snapshot.record = record;
            }
            None => {
                // Stored copy gone; keep ours and write it back
                debug!("Ledger missing from cache on reload, re-persisting");
                self.cache
                    .set_with_ttl(LEDGER_KEY, &snapshot.record, None);
            }
        }
        snapshot.loaded_at = now;
    }

    fn persist(&self, snapshot: &mut Snapshot, now: DateTime<Utc>) {
        snapshot.record.last_updated = Some(now);
        self.cache.set_with_ttl(LEDGER_KEY, &snapshot.record, None);
    }

    fn publish(&self, wrap: fn(LedgerChangeEvent) -> Event, booking: &Booking) {
        if let Some(events) = &self.events {
            events.publish(wrap(LedgerChangeEvent {
                booking_id: booking.id.clone(),
                station_id: booking.station_id,
                status: booking.status,
            }));
        }
    }
}

fn load_record(cache: &PersistentCache) -> LedgerRecord {
    cache.get::<LedgerRecord>(LEDGER_KEY).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{CacheSettings, DurableStore, InMemoryStore};
    use crate::notifications::EventBus;
    use crate::shared::clock::ManualClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn persistent_settings() -> CacheSettings {
        CacheSettings {
            persistence_enabled: true,
            ..CacheSettings::default()
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryStore>,
        cache: Arc<PersistentCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(t0()));
            let store = Arc::new(InMemoryStore::new());
            let cache = Arc::new(PersistentCache::new(
                persistent_settings(),
                store.clone(),
                clock.clone(),
            ));
            Self { clock, store, cache }
        }

        fn ledger(&self) -> BookingLedger {
            BookingLedger::new(self.cache.clone(), self.clock.clone(), LedgerSettings::default())
        }
    }

    fn request(station_id: u32, booked_time: DateTime<Utc>) -> NewBooking {
        NewBooking {
            station_id,
            station_name: format!("Station {station_id}"),
            station_location: "Somewhere".to_string(),
            booked_time,
            expiry_time: None,
        }
    }

    #[test]
    fn add_booking_fills_defaults() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let booked = t0() + Duration::hours(1);

        let booking = ledger.add_booking(request(1, booked));
        assert!(booking.id.starts_with("booking_"));
        assert_eq!(booking.status, BookingStatus::Upcoming);
        assert_eq!(booking.created_at, t0());
        assert_eq!(booking.expiry_time, Some(booked + Duration::minutes(12)));
        assert_eq!(ledger.get_booking(&booking.id), Some(booking));
    }

    #[test]
    fn add_booking_is_idempotent_within_window() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let booked = t0() + Duration::hours(1);

        let first = ledger.add_booking(request(1, booked));
        let again = ledger.add_booking(request(1, booked + Duration::seconds(30)));
        assert_eq!(first, again);
        assert_eq!(ledger.get_stats().total, 1);

        ledger.add_booking(request(1, booked + Duration::seconds(61)));
        ledger.add_booking(request(2, booked));
        assert_eq!(ledger.get_stats().total, 3);
    }

    #[test]
    fn update_unknown_id_returns_none() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        assert!(ledger
            .update_booking("booking_0_missing", BookingPatch::status(BookingStatus::Active))
            .is_none());
    }

    #[test]
    fn update_merges_fields() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let booking = ledger.add_booking(request(1, t0()));

        let updated = ledger
            .update_booking(
                &booking.id,
                BookingPatch {
                    station_name: Some("Renamed".to_string()),
                    ..BookingPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.station_name, "Renamed");
        assert_eq!(updated.status, BookingStatus::Upcoming);
        assert_eq!(updated.booked_time, booking.booked_time);
    }

    #[test]
    fn remove_reports_existence() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let booking = ledger.add_booking(request(1, t0()));

        assert!(ledger.remove_booking(&booking.id));
        assert!(!ledger.remove_booking(&booking.id));
        assert!(ledger.get_all_bookings().is_empty());
    }

    #[test]
    fn station_booked_only_while_live() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let booking = ledger.add_booking(request(4, t0() + Duration::hours(2)));

        assert!(ledger.is_station_booked(4));
        assert!(!ledger.is_station_booked(5));
        assert_eq!(
            ledger.get_live_booking_for_station(4).map(|b| b.id),
            Some(booking.id.clone())
        );

        ledger.cancel_booking(&booking.id);
        assert!(!ledger.is_station_booked(4));
        assert!(ledger.get_live_booking_for_station(4).is_none());
        assert_eq!(ledger.get_bookings_for_station(4).len(), 1);
    }

    #[test]
    fn stats_count_by_status() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let a = ledger.add_booking(request(1, t0()));
        let b = ledger.add_booking(request(2, t0()));
        ledger.add_booking(request(3, t0()));
        ledger.update_booking(&a.id, BookingPatch::status(BookingStatus::Completed));
        ledger.cancel_booking(&b.id);

        let stats = ledger.get_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.upcoming, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn all_bookings_newest_first() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let older = ledger.add_booking(request(1, t0() + Duration::hours(3)));
        fx.clock.advance(Duration::minutes(5));
        let newer = ledger.add_booking(request(2, t0() + Duration::hours(1)));

        let ids: Vec<_> = ledger.get_all_bookings().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn refresh_statuses_activates_and_expires() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let soon = ledger.add_booking(request(1, t0() + Duration::minutes(30)));
        let later = ledger.add_booking(request(2, t0() + Duration::hours(3)));

        let changed = ledger.refresh_statuses(t0() + Duration::minutes(31));
        assert_eq!(changed.len(), 1);
        assert_eq!(ledger.get_booking(&soon.id).unwrap().status, BookingStatus::Active);
        assert_eq!(ledger.get_booking(&later.id).unwrap().status, BookingStatus::Upcoming);

        ledger.refresh_statuses(t0() + Duration::minutes(43));
        assert_eq!(ledger.get_booking(&soon.id).unwrap().status, BookingStatus::Expired);
        assert!(!ledger.is_station_booked(1));
    }

    #[test]
    fn survives_restart_through_durable_store() {
        let fx = Fixture::new();
        let booking = fx.ledger().add_booking(request(1, t0()));

        let cache = Arc::new(PersistentCache::new(
            persistent_settings(),
            fx.store.clone(),
            fx.clock.clone(),
        ));
        let reopened =
            BookingLedger::new(cache, fx.clock.clone(), LedgerSettings::default());
        assert_eq!(reopened.get_booking(&booking.id), Some(booking));
    }

    #[test]
    fn malformed_stored_ledger_loads_empty() {
        let fx = Fixture::new();
        fx.store
            .set_item(
                "ev_cache_bookings_ledger",
                r#"{"data":"not a ledger","timestamp":"2026-03-02T09:00:00Z"}"#,
            )
            .unwrap();

        let ledger = fx.ledger();
        assert!(ledger.get_all_bookings().is_empty());
        assert_eq!(ledger.get_stats(), BookingStats::default());
    }

    #[test]
    fn stale_snapshot_reloads_after_freshness_window() {
        let fx = Fixture::new();
        let reader = fx.ledger();
        let writer = fx.ledger();
        writer.add_booking(request(1, t0()));

        assert!(reader.get_all_bookings().is_empty());
        fx.clock.advance(Duration::hours(25));
        assert_eq!(reader.get_all_bookings().len(), 1);
    }

    #[test]
    fn clear_all_removes_everything() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        ledger.add_booking(request(1, t0()));
        ledger.add_booking(request(2, t0()));
        ledger.clear_all_bookings();

        assert_eq!(ledger.get_stats().total, 0);
        let reopened = fx.ledger();
        assert!(reopened.get_all_bookings().is_empty());
    }

    #[tokio::test]
    async fn mutations_publish_ledger_events() {
        let fx = Fixture::new();
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();
        let ledger = fx.ledger().with_events(bus.clone());

        let booking = ledger.add_booking(request(7, t0()));
        ledger.cancel_booking(&booking.id);
        ledger.remove_booking(&booking.id);

        let mut seen = Vec::new();
        while let Some(msg) = sub.try_recv() {
            assert_eq!(msg.event.station_id(), 7);
            seen.push(msg.event.event_type());
        }
        assert_eq!(seen, vec!["booking_created", "booking_updated", "booking_removed"]);
    }
}
