//! Async driver for one booking dialog
//!
//! A session owns a [`BookingLifecycleController`], a task that feeds it
//! the simulation clock's ordered ticks, and at most one pending payment
//! notification. Closing (or dropping) the session aborts both tasks, so
//! nothing reaches the controller once the dialog is gone. A flow that
//! resolves (arrival recorded or window expired) drops its pending payment
//! notification too. Opening the dialog again means opening a new session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lifecycle::{BookingLifecycleController, FlowState};
use crate::domain::{DomainResult, TimeSlot};
use crate::notifications::{BookingConfirmedEvent, Event, FlowResolvedEvent, SharedEventBus};
use crate::shared::clock::{ClockTick, SimulationClock};

pub struct BookingFlowSession {
    controller: Arc<Mutex<BookingLifecycleController>>,
    events: SharedEventBus,
    closed: Arc<AtomicBool>,
    tick_task: JoinHandle<()>,
    payment_task: PendingPayment,
}

type PendingPayment = Arc<Mutex<Option<JoinHandle<()>>>>;

impl BookingFlowSession {
    /// Start a session. Must be called from within a tokio runtime.
    pub fn open(
        controller: BookingLifecycleController,
        clock: &SimulationClock,
        events: SharedEventBus,
    ) -> Self {
        let station_id = controller.target().station_id;
        let controller = Arc::new(Mutex::new(controller));
        let closed = Arc::new(AtomicBool::new(false));
        let payment_task: PendingPayment = Arc::new(Mutex::new(None));

        // Subscribe before spawning so no tick is missed
        let ticks = clock.subscribe();
        let tick_task = tokio::spawn(run_ticks(
            ticks,
            controller.clone(),
            closed.clone(),
            events.clone(),
            payment_task.clone(),
        ));

        info!(station_id, "Booking flow opened");
        Self {
            controller,
            events,
            closed,
            tick_task,
            payment_task,
        }
    }

    pub fn state(&self) -> FlowState {
        self.controller().state()
    }

    pub fn selected_slot(&self) -> Option<TimeSlot> {
        self.controller().selected_slot().cloned()
    }

    pub fn remaining_seconds(&self) -> f64 {
        self.controller().remaining_seconds()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn select_slot(&self, slot: TimeSlot) -> DomainResult<()> {
        let event = self.controller().select_slot(slot)?;
        self.events.publish(Event::SlotSelected(event));
        Ok(())
    }

    /// Confirm the selected slot and schedule the payment notification.
    pub fn confirm(&self, now: DateTime<Utc>) -> DomainResult<BookingConfirmedEvent> {
        let (event, delay) = {
            let mut controller = self.controller();
            let event = controller.confirm(now)?;
            (event, controller.config().payment_delay)
        };
        self.events.publish(Event::BookingConfirmed(event.clone()));

        let delay = delay.to_std().unwrap_or_default();
        let events = self.events.clone();
        let closed = self.closed.clone();
        let controller = self.controller.clone();
        let paid = event.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Held while publishing so a tick cannot resolve the flow in between
            let controller = controller.lock().unwrap_or_else(PoisonError::into_inner);
            if closed.load(Ordering::SeqCst) || !awaiting_payment(&controller, &paid) {
                debug!(station_id = paid.station_id, "Flow resolved before payment, dropped");
                return;
            }
            info!(station_id = paid.station_id, "Payment processed");
            events.publish(Event::PaymentProcessed(paid));
        });

        let mut pending = self.payment_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
        Ok(event)
    }

    pub fn record_arrival(&self, now: DateTime<Utc>) -> DomainResult<FlowResolvedEvent> {
        let event = self.controller().record_arrival(now)?;
        cancel_payment(&self.payment_task);
        self.events.publish(Event::BookingResolved(event.clone()));
        Ok(event)
    }

    /// Close the dialog. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abort_tasks();
        let event = self.controller().close();
        self.events.publish(Event::FlowClosed(event));
    }

    fn abort_tasks(&self) {
        self.tick_task.abort();
        cancel_payment(&self.payment_task);
    }

    fn controller(&self) -> MutexGuard<'_, BookingLifecycleController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BookingFlowSession {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.abort_tasks();
    }
}

async fn run_ticks(
    mut ticks: broadcast::Receiver<ClockTick>,
    controller: Arc<Mutex<BookingLifecycleController>>,
    closed: Arc<AtomicBool>,
    events: SharedEventBus,
    payment_task: PendingPayment,
) {
    loop {
        match ticks.recv().await {
            Ok(tick) => {
                let emitted = {
                    let mut controller =
                        controller.lock().unwrap_or_else(PoisonError::into_inner);
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    controller.tick(tick.now, tick.speed)
                };
                if emitted
                    .iter()
                    .any(|e| matches!(e, Event::ArrivalWindowExpired(_)))
                {
                    cancel_payment(&payment_task);
                }
                for event in emitted {
                    events.publish(event);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Booking flow fell behind the clock, ticks skipped");
            }
            Err(RecvError::Closed) => {
                debug!("Clock dropped, tick loop ending");
                break;
            }
        }
    }
}

/// The confirmation `paid` still belongs to the controller's live flow.
fn awaiting_payment(
    controller: &BookingLifecycleController,
    paid: &BookingConfirmedEvent,
) -> bool {
    controller.state() != FlowState::Selecting
        && controller
            .selected_slot()
            .is_some_and(|slot| slot.start_time == paid.booked_time)
}

fn cancel_payment(pending: &PendingPayment) {
    if let Some(task) = pending.lock().unwrap_or_else(PoisonError::into_inner).take() {
        task.abort();
    }
}
