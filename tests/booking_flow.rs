use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use ev_booking::application::{FlowState, StationFilter};
use ev_booking::config::AppConfig;
use ev_booking::domain::{demo_stations, BookingStatus, RefundTier};
use ev_booking::infrastructure::InMemoryStore;
use ev_booking::notifications::{Event, EventSubscriber};
use ev_booking::shared::clock::Clock;
use ev_booking::shared::ShutdownSignal;
use ev_booking::AppServices;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 14, 5, 0).unwrap()
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.persistence_enabled = true;
    config.booking.payment_delay_ms = 10;
    config.simulation.speed = 60.0;
    config.predictor.seed = Some(21);
    config
}

async fn wait_for(sub: &mut EventSubscriber, matches: impl Fn(&Event) -> bool) -> Event {
    tokio::time::timeout(StdDuration::from_secs(2), async {
        loop {
            let msg = sub.recv().await.expect("bus closed");
            if matches(&msg.event) {
                return msg.event;
            }
        }
    })
    .await
    .expect("Timeout")
}

#[tokio::test]
async fn booking_is_recorded_and_completed() {
    let store = Arc::new(InMemoryStore::new());
    let app = AppServices::with_store(config(), demo_stations(), start(), store.clone());
    let shutdown = ShutdownSignal::new();
    let writer = app.spawn_ledger_writer(shutdown.clone());
    let mut sub = app.events.subscribe();

    let ranked = app.ranked_stations(&StationFilter::All, "");
    let station_id = ranked[0].station.id;

    let session = app.open_booking_flow(station_id).unwrap();
    let slot = app.time_slots().remove(0);
    assert_eq!(slot.start_time, Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap());

    session.select_slot(slot.clone()).unwrap();
    session.confirm(app.clock.now()).unwrap();

    // Payment arrives after the configured delay and lands in the ledger
    wait_for(&mut sub, |e| matches!(e, Event::BookingCreated(_))).await;
    assert!(app.ledger.is_station_booked(station_id));

    app.clock.jump(Duration::minutes(55));
    wait_for(&mut sub, |e| matches!(e, Event::CountdownStarted(_))).await;
    assert_eq!(session.state(), FlowState::CountingDown);

    let resolved = session
        .record_arrival(slot.start_time + Duration::minutes(9))
        .unwrap();
    assert_eq!(resolved.refund, RefundTier::Full);

    wait_for(&mut sub, |e| {
        matches!(e, Event::BookingUpdated(u) if u.status == BookingStatus::Completed)
    })
    .await;
    assert!(!app.ledger.is_station_booked(station_id));
    assert_eq!(app.ledger.get_stats().completed, 1);

    session.close();
    shutdown.trigger();
    tokio::time::timeout(StdDuration::from_secs(1), writer)
        .await
        .expect("writer did not stop")
        .unwrap();

    // Same durable store, fresh process
    let reopened = AppServices::with_store(config(), demo_stations(), start(), store);
    let bookings = reopened.ledger.get_all_bookings();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].station_id, station_id);
    assert_eq!(bookings[0].status, BookingStatus::Completed);
    assert_eq!(bookings[0].booked_time, slot.start_time);
}

#[tokio::test]
async fn missed_arrival_expires_booking() {
    let app = AppServices::with_store(
        config(),
        demo_stations(),
        start(),
        Arc::new(InMemoryStore::new()),
    );
    let shutdown = ShutdownSignal::new();
    let _writer = app.spawn_ledger_writer(shutdown.clone());
    let mut sub = app.events.subscribe();

    let session = app.open_booking_flow(5).unwrap();
    let slot = app.time_slots().remove(0);
    session.select_slot(slot).unwrap();
    session.confirm(app.clock.now()).unwrap();
    wait_for(&mut sub, |e| matches!(e, Event::BookingCreated(_))).await;

    app.clock.jump(Duration::minutes(55));
    wait_for(&mut sub, |e| matches!(e, Event::CountdownStarted(_))).await;

    // 600 simulated seconds at 60x with one-second ticks
    for _ in 0..10 {
        app.clock.tick(Duration::seconds(1));
    }
    match wait_for(&mut sub, |e| matches!(e, Event::ArrivalWindowExpired(_))).await {
        Event::ArrivalWindowExpired(e) => assert_eq!(e.refund, RefundTier::None),
        _ => unreachable!(),
    }
    wait_for(&mut sub, |e| {
        matches!(e, Event::BookingUpdated(u) if u.status == BookingStatus::Expired)
    })
    .await;

    assert_eq!(session.state(), FlowState::Selecting);
    assert_eq!(app.ledger.get_stats().expired, 1);
    shutdown.trigger();
}

#[tokio::test]
async fn expiry_before_payment_leaves_station_free() {
    let mut config = config();
    config.booking.payment_delay_ms = 500;
    config.simulation.speed = 600.0;
    let app = AppServices::with_store(
        config,
        demo_stations(),
        start(),
        Arc::new(InMemoryStore::new()),
    );
    let shutdown = ShutdownSignal::new();
    let _writer = app.spawn_ledger_writer(shutdown.clone());
    let mut sub = app.events.subscribe();

    let session = app.open_booking_flow(5).unwrap();
    session.select_slot(app.time_slots().remove(0)).unwrap();
    session.confirm(app.clock.now()).unwrap();

    app.clock.jump(Duration::minutes(55));
    wait_for(&mut sub, |e| matches!(e, Event::CountdownStarted(_))).await;

    // One tick at 600x spends the whole arrival window
    app.clock.tick(Duration::seconds(1));
    wait_for(&mut sub, |e| matches!(e, Event::ArrivalWindowExpired(_))).await;

    tokio::time::sleep(StdDuration::from_millis(700)).await;
    while let Some(msg) = sub.try_recv() {
        assert!(!matches!(
            msg.event,
            Event::PaymentProcessed(_) | Event::BookingCreated(_)
        ));
    }
    assert!(!app.ledger.is_station_booked(5));
    assert_eq!(app.ledger.get_stats().total, 0);

    session.close();
    assert!(app.open_booking_flow(5).is_ok());
    shutdown.trigger();
}
