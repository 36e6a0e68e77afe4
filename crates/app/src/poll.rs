//! Poll scheduler: fixed-interval sampling of the configured sensors.
//!
//! Every tick starts a cycle: enable all monitored sensors, wait for the
//! settle delay, read and decode each sensor, disable them again and hand
//! the batch to the metrics sink. The settle delay is a timer continuation,
//! so a disconnect in the middle of a cycle is handled before the reads and
//! cancels the rest of the cycle. State is only checked when a continuation
//! is handled: adapter calls complete before the next event is dispatched,
//! and a failed call on one sensor does not stop the others.

use std::time::Duration;

use sensortag_domain::reading::ReadingBatch;
use sensortag_domain::sensor::SensorKind;
use sensortag_domain::time::{Timestamp, now};

use crate::connection::ConnectionState;
use crate::event::Event;
use crate::monitor::Monitor;
use crate::ports::{AdapterService, MetricsSink};
use crate::sensor_controller::{read_readings, set_enabled};
use crate::timer::{TimerHandle, Timers};

#[derive(Debug)]
struct PollCycle {
    id: u64,
    timestamp: Timestamp,
    enabled: Vec<SensorKind>,
    _settle: TimerHandle,
}

/// Periodic tick source plus the cycle currently in flight, if any.
#[derive(Debug, Default)]
pub struct PollScheduler {
    ticker: Option<TimerHandle>,
    cycle: Option<PollCycle>,
    cycles: u64,
}

impl PollScheduler {
    /// Whether ticks are being produced.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Identifier of the cycle waiting for its settle delay.
    #[must_use]
    pub fn in_flight(&self) -> Option<u64> {
        self.cycle.as_ref().map(|cycle| cycle.id)
    }

    /// Number of cycles started so far.
    #[must_use]
    pub fn cycles_started(&self) -> u64 {
        self.cycles
    }

    pub(crate) fn start(&mut self, timers: &Timers, interval: Duration) {
        self.ticker = Some(timers.every(interval, Event::PollTick));
    }

    /// Stop ticking and abandon the in-flight cycle.
    pub(crate) fn stop(&mut self) {
        self.ticker = None;
        self.cycle = None;
    }

    fn begin(&mut self, timers: &Timers, settle: Duration, enabled: Vec<SensorKind>) -> u64 {
        self.cycles += 1;
        let id = self.cycles;
        self.cycle = Some(PollCycle {
            id,
            timestamp: now(),
            enabled,
            _settle: timers.after(settle, Event::SettleElapsed { cycle: id }),
        });
        id
    }

    fn take(&mut self, id: u64) -> Option<PollCycle> {
        if self.in_flight() == Some(id) {
            self.cycle.take()
        } else {
            None
        }
    }
}

impl<A: AdapterService, M: MetricsSink> Monitor<A, M> {
    /// Enter `Monitoring` once every monitored sensor is configured and
    /// fully registered.
    pub(crate) fn start_monitoring_if_ready(&mut self) {
        if self.session.state != ConnectionState::Configuring || !self.session.all_configured() {
            return;
        }
        if !self.session.ready_to_poll() {
            tracing::warn!("sensors configured but characteristics are missing");
            return;
        }

        self.session.state = ConnectionState::Monitoring;
        self.session
            .poll
            .start(&self.timers, self.config.poll_interval);
        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "monitoring started"
        );
    }

    fn is_monitoring(&self) -> bool {
        self.session.state == ConnectionState::Monitoring
    }

    pub(crate) async fn on_poll_tick(&mut self) {
        if !self.is_monitoring() {
            self.session.poll.stop();
            return;
        }
        if let Some(cycle) = self.session.poll.in_flight() {
            tracing::debug!(cycle, "previous cycle still running, skipping tick");
            return;
        }
        if !self.session.ready_to_poll() {
            tracing::warn!("sensors not ready, skipping tick");
            return;
        }

        let mut enabled = Vec::new();
        for kind in self.session.monitored() {
            match set_enabled(&self.adapter, &self.session.registry, kind, true).await {
                Ok(()) => enabled.push(kind),
                Err(err) => tracing::warn!(sensor = %kind, %err, "failed to enable sensor"),
            }
        }

        let cycle = self
            .session
            .poll
            .begin(&self.timers, self.config.settle_delay, enabled);
        tracing::debug!(cycle, "poll cycle started");
    }

    pub(crate) async fn on_settle_elapsed(&mut self, id: u64) {
        if !self.is_monitoring() {
            return;
        }
        let Some(cycle) = self.session.poll.take(id) else {
            tracing::debug!(cycle = id, "ignoring stale settle timer");
            return;
        };

        let mut batch = ReadingBatch::new(cycle.timestamp);
        for kind in &cycle.enabled {
            match read_readings(&self.adapter, &self.session.registry, *kind).await {
                Ok(readings) => batch.extend(readings),
                Err(err) => tracing::warn!(sensor = %kind, %err, "failed to read sensor"),
            }
        }

        for kind in self.session.monitored() {
            if let Err(err) = set_enabled(&self.adapter, &self.session.registry, kind, false).await
            {
                tracing::warn!(sensor = %kind, %err, "failed to disable sensor");
            }
        }

        if batch.is_empty() {
            tracing::warn!(cycle = id, "poll cycle produced no readings");
            return;
        }
        for reading in &batch.readings {
            tracing::info!(cycle = id, "{reading}");
        }
        if let Err(err) = self.sink.publish(&batch).await {
            tracing::warn!(cycle = id, %err, "failed to publish readings");
        }
    }
}
