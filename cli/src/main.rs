//! EV booking simulator
//!
//! Runs one booking flow against the demo station list on an accelerated
//! clock: ranks the stations, books the first free slot at the chosen
//! station, records the paid booking in the ledger and ticks the clock
//! until the flow resolves.
//!
//! ```sh
//! # Default config (~/.config/ev-booking/config.toml), 1x speed
//! ev-booking-sim
//!
//! # One simulated minute per second, book station 3
//! ev-booking-sim --speed 60 --station 3
//!
//! # Driver turns up 11 minutes late (partial refund)
//! ev-booking-sim --speed 120 --arrive-after 11
//!
//! # Validate config without running
//! ev-booking-sim --check
//! ```

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{error, info, warn};

use ev_booking::app::record_flow_event;
use ev_booking::application::StationFilter;
use ev_booking::config::AppConfig;
use ev_booking::domain::demo_stations;
use ev_booking::notifications::Event;
use ev_booking::shared::clock::Clock;
use ev_booking::shared::{listen_for_shutdown_signals, ShutdownSignal};
use ev_booking::{init_tracing, AppServices};

/// Accelerated-clock simulator for the EV booking flow.
#[derive(Parser, Debug)]
#[command(
    name = "ev-booking-sim",
    version,
    about = "Simulate an EV charging slot booking on an accelerated clock",
    long_about = "Ranks the demo stations by predicted availability, books the first \
                  slot at one of them and drives the arrival countdown with a \
                  simulated clock.\n\n\
                  Default config: ~/.config/ev-booking/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "EV_BOOKING_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated seconds per wall-clock second.
    #[arg(short, long)]
    speed: Option<f64>,

    /// Station to book; defaults to the best-ranked free station.
    #[arg(long)]
    station: Option<u32>,

    /// Only consider stations of this charger type (all, standard, fast, rapid).
    #[arg(long, default_value = "all")]
    filter: String,

    /// Seed for the occupancy predictor.
    #[arg(long)]
    seed: Option<u64>,

    /// Simulate the driver checking in this many minutes after the slot starts.
    #[arg(long)]
    arrive_after: Option<i64>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without running.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(ev_booking::default_config_path);

    let (mut config, loaded) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, Ok(())),
        Err(e) => (AppConfig::default(), Err(e)),
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(speed) = cli.speed {
        config.simulation.speed = speed;
    }
    if let Some(seed) = cli.seed {
        config.predictor.seed = Some(seed);
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config);
    match loaded {
        Ok(()) => info!("Configuration loaded from {}", config_path.display()),
        Err(e) => {
            warn!("Failed to load config from {}: {}", config_path.display(), e);
            warn!("Using default configuration.");
        }
    }

    if let Err(e) = config.check() {
        error!("Invalid configuration after overrides: {}", e);
        return Err(e.into());
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("Configuration is valid");
        println!("   Config file  : {}", config_path.display());
        println!("   Persistence  : {}", config.storage.persistence_enabled);
        println!("   Store path   : {}", config.storage.resolved_path().display());
        println!("   Speed        : {}x", config.simulation.speed);
        println!(
            "   Refund       : full ≤ {} min, partial ≤ {} min",
            config.booking.refund.full_refund_mins, config.booking.refund.grace_mins
        );
        println!("   Log level    : {}", config.logging.level);
        return Ok(());
    }

    let filter = StationFilter::from_str(&cli.filter)
        .ok_or_else(|| format!("unknown station filter '{}'", cli.filter))?;
    let tick_interval = config.simulation.tick_interval();
    let app = AppServices::build(config, demo_stations(), Utc::now());

    // ── Station list ───────────────────────────────────────────
    let ranked = app.ranked_stations(&filter, "");
    println!(
        "{:<4} {:<28} {:<9} {:>6} {:>5} {:>9}",
        "ID", "Station", "Type", "Free", "Wait", "Distance"
    );
    for r in &ranked {
        println!(
            "{:<4} {:<28} {:<9} {:>6} {:>4}m {:>7.1}km  {}",
            r.station.id,
            r.station.name,
            r.station.charger_type.as_str(),
            r.prediction.availability,
            r.prediction.wait_time,
            r.station.distance_km,
            r.prediction.status.label(),
        );
    }

    let station_id = match cli.station {
        Some(id) => id,
        None => ranked
            .iter()
            .map(|r| r.station.id)
            .find(|id| !app.ledger.is_station_booked(*id))
            .ok_or("no free station matches the filter")?,
    };

    // ── Booking flow ───────────────────────────────────────────
    let shutdown = ShutdownSignal::new();
    tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

    let mut events = app.events.subscribe_station(station_id);
    let session = app.open_booking_flow(station_id)?;
    let slot = app
        .time_slots()
        .into_iter()
        .next()
        .ok_or("no bookable slots")?;
    let mut arrival_at = cli.arrive_after.map(|m| slot.start_time + Duration::minutes(m));

    session.select_slot(slot.clone())?;
    session.confirm(app.clock.now())?;
    info!(
        station_id,
        slot = %slot.id,
        speed = app.clock.speed(),
        "Booked, waiting for the slot to start"
    );

    let wall_tick = tick_interval.to_std().unwrap_or(StdDuration::from_secs(1));
    let mut ticker = tokio::time::interval(wall_tick);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tick = app.clock.tick(tick_interval);
                app.ledger.refresh_statuses(tick.now);
                if arrival_at.is_some_and(|at| tick.now >= at) {
                    arrival_at = None;
                    if let Err(e) = session.record_arrival(tick.now) {
                        warn!(error = %e, "Arrival not recorded");
                    }
                }
            }
            msg = events.recv() => {
                let Some(msg) = msg else { break };
                record_flow_event(&app.ledger, &msg.event);
                match &msg.event {
                    Event::PaymentProcessed(_) => println!("Payment processed"),
                    Event::CountdownStarted(e) => {
                        println!("Slot started, {:.0}s to arrive", e.arrival_window_secs)
                    }
                    Event::ArrivalWindowExpired(_) => {
                        println!("Arrival window expired, no refund");
                        break;
                    }
                    Event::BookingResolved(e) => {
                        println!(
                            "Arrived {} min after slot start, refund: {}",
                            e.elapsed_secs / 60,
                            e.refund.as_str()
                        );
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown.wait() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.close();
    let stats = app.ledger.get_stats();
    println!(
        "Ledger: {} total, {} upcoming, {} active, {} completed, {} expired, {} cancelled",
        stats.total, stats.upcoming, stats.active, stats.completed, stats.expired, stats.cancelled
    );

    Ok(())
}
