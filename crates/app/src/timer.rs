//! Timer continuations delivered back into the event loop.
//!
//! Delays never block the loop: a timer task sleeps and then sends its
//! [`Event`] through the loop's continuation channel. Dropping the returned
//! [`TimerHandle`] cancels the timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::event::Event;

/// Owned handle to a pending or periodic timer. Aborts the timer on drop.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Whether the timer has fired (one-shot) or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Schedules continuations on the event loop's channel.
#[derive(Debug, Clone)]
pub struct Timers {
    tx: mpsc::UnboundedSender<Event>,
}

impl Timers {
    /// Create a scheduler and the receiving end the event loop listens on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver `event` once, after `delay`.
    #[must_use]
    pub fn after(&self, delay: Duration, event: Event) -> TimerHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
        TimerHandle { task }
    }

    /// Deliver `event` now and then every `period`.
    ///
    /// Ticks are anchored on the intended fire times; a late tick does not
    /// shift the following ones and missed ticks are skipped.
    #[must_use]
    pub fn every(&self, period: Duration, event: Event) -> TimerHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now(), period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(event.clone()).is_err() {
                    break;
                }
            }
        });
        TimerHandle { task }
    }
}
