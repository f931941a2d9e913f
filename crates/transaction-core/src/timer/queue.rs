//! Delayed re-injection of timer events.
//!
//! The [`TimerQueue`] knows nothing about transaction logic. Each scheduled
//! timer is a one-shot tokio task that sleeps for the requested duration and
//! then pushes an [`Event::Timer`] back into the dispatcher's input, so a
//! fired timer travels the same ordered path as any other event for its
//! transaction id.
//!
//! Timers are never cancelled here. Every [`TimerEvent`] carries a sequence
//! number and the owning transaction ignores fires whose number is no
//! longer current.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::transaction::{Event, TimerEvent};

/// Schedules timer events for re-delivery through the dispatcher.
#[derive(Debug, Clone)]
pub struct TimerQueue {
    events_tx: mpsc::UnboundedSender<Event>,
}

impl TimerQueue {
    /// Creates a queue that delivers fired timers into `events_tx`.
    pub fn new(events_tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { events_tx }
    }

    /// Starts a one-shot timer.
    ///
    /// The returned handle may be dropped; the timer keeps running.
    pub fn schedule(&self, timer: TimerEvent) -> JoinHandle<()> {
        let events_tx = self.events_tx.clone();
        trace!(id = %timer.key, timer = %timer.timer, duration = ?timer.duration, seq = timer.seq, "scheduling timer");

        tokio::spawn(async move {
            sleep(timer.duration).await;
            let key = timer.key.clone();
            let kind = timer.timer;
            if events_tx.send(Event::Timer(timer)).is_err() {
                debug!(id = %key, timer = %kind, "dispatcher gone, dropping fired timer");
            }
        })
    }
}
