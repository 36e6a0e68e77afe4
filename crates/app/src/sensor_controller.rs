//! Sensor controllers: per-sensor configuration state and the I/O steps
//! (period write, enable/disable, read-and-decode) performed on a sensor's
//! characteristics.
//!
//! The configuration handshake writes the sampling period of every
//! monitored sensor. Sensors are handled independently: a failed write only
//! schedules a retry of that sensor after a fixed backoff, and the others
//! carry on.

use sensortag_domain::codec;
use sensortag_domain::error::{NotFoundError, SensorTagError};
use sensortag_domain::reading::Reading;
use sensortag_domain::sensor::{CharacteristicRole, SensorKind};

use crate::connection::ConnectionState;
use crate::event::Event;
use crate::monitor::Monitor;
use crate::ports::{AdapterService, MetricsSink, ObjectPath};
use crate::registry::CharacteristicRegistry;
use crate::timer::TimerHandle;

/// Runtime state of one sensor.
#[derive(Debug)]
pub struct SensorController {
    kind: SensorKind,
    monitored: bool,
    configured: bool,
    attempts: u32,
    retry: Option<TimerHandle>,
    /// Id of the latest scheduled retry. Survives `reset`.
    retry_id: u64,
}

impl SensorController {
    #[must_use]
    pub fn new(kind: SensorKind, monitored: bool) -> Self {
        Self {
            kind,
            monitored,
            configured: false,
            attempts: 0,
            retry: None,
            retry_id: 0,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    #[must_use]
    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Period writes attempted since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a configuration retry is scheduled.
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.retry.as_ref().is_some_and(|retry| !retry.is_finished())
    }

    pub(crate) fn mark_configured(&mut self) {
        self.configured = true;
        self.retry = None;
    }

    fn next_retry(&mut self) -> u64 {
        self.retry_id += 1;
        self.retry_id
    }

    /// Consume the pending retry if `retry` is the one scheduled last.
    fn take_retry(&mut self, retry: u64) -> bool {
        if self.retry.is_none() || retry != self.retry_id {
            return false;
        }
        self.retry = None;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.configured = false;
        self.attempts = 0;
        self.retry = None;
    }
}

fn handle(
    registry: &CharacteristicRegistry,
    sensor: SensorKind,
    role: CharacteristicRole,
) -> Result<&ObjectPath, SensorTagError> {
    registry.lookup(sensor, role).ok_or_else(|| {
        NotFoundError {
            kind: "characteristic",
            id: sensor.descriptor().uuid(role).to_string(),
        }
        .into()
    })
}

/// Write the sampling period of `sensor`.
pub(crate) async fn write_period<A: AdapterService>(
    adapter: &A,
    registry: &CharacteristicRegistry,
    sensor: SensorKind,
    period: std::time::Duration,
) -> Result<(), SensorTagError> {
    let path = handle(registry, sensor, CharacteristicRole::Period)?;
    adapter
        .write_value(path, &codec::encode_period(period))
        .await
}

/// Turn data capture of `sensor` on or off.
pub(crate) async fn set_enabled<A: AdapterService>(
    adapter: &A,
    registry: &CharacteristicRegistry,
    sensor: SensorKind,
    enabled: bool,
) -> Result<(), SensorTagError> {
    let path = handle(registry, sensor, CharacteristicRole::Config)?;
    let command = if enabled {
        codec::ENABLE
    } else {
        codec::DISABLE
    };
    adapter.write_value(path, &command).await
}

/// Read the data characteristic of `sensor` and decode it.
pub(crate) async fn read_readings<A: AdapterService>(
    adapter: &A,
    registry: &CharacteristicRegistry,
    sensor: SensorKind,
) -> Result<Vec<Reading>, SensorTagError> {
    let path = handle(registry, sensor, CharacteristicRole::Data)?;
    let payload = adapter.read_value(path).await?;
    Ok((sensor.descriptor().decode)(&payload)?)
}

impl<A: AdapterService, M: MetricsSink> Monitor<A, M> {
    /// Enter `Configuring` and start the handshake of every monitored
    /// sensor that is not configured yet.
    pub(crate) async fn begin_configuration(&mut self) {
        self.session.state = ConnectionState::Configuring;
        tracing::info!("configuring sensors");

        for kind in self.session.monitored() {
            if !self.session.sensor(kind).is_configured() {
                self.configure_sensor(kind).await;
            }
        }
    }

    async fn configure_sensor(&mut self, kind: SensorKind) {
        let sensor = self.session.sensor_mut(kind);
        sensor.attempts += 1;
        let attempt = sensor.attempts;

        tracing::debug!(
            sensor = %kind,
            attempt,
            period_ms = self.config.poll_interval.as_millis(),
            "writing sampling period"
        );

        let result = write_period(
            &self.adapter,
            &self.session.registry,
            kind,
            self.config.poll_interval,
        )
        .await;

        let event = match result {
            Ok(()) => Event::CharacteristicWriteDone {
                sensor: kind,
                role: CharacteristicRole::Period,
            },
            Err(err) => {
                tracing::warn!(sensor = %kind, attempt, %err, "failed to write sampling period");
                Event::CharacteristicWriteFailed {
                    sensor: kind,
                    role: CharacteristicRole::Period,
                }
            }
        };
        self.pending.push_back(event);
    }

    pub(crate) fn on_write_done(&mut self, kind: SensorKind, role: CharacteristicRole) {
        if role != CharacteristicRole::Period
            || self.session.state != ConnectionState::Configuring
        {
            return;
        }

        self.session.sensor_mut(kind).mark_configured();
        tracing::info!(sensor = %kind, "sensor configured");
        self.start_monitoring_if_ready();
    }

    pub(crate) fn on_write_failed(&mut self, kind: SensorKind, role: CharacteristicRole) {
        if role != CharacteristicRole::Period
            || self.session.state != ConnectionState::Configuring
            || self.session.sensor(kind).is_configured()
        {
            return;
        }

        let backoff = self.config.configure_backoff;
        tracing::debug!(sensor = %kind, backoff_ms = backoff.as_millis(), "retrying configuration");
        let sensor = self.session.sensor_mut(kind);
        let retry = sensor.next_retry();
        sensor.retry = Some(self.timers.after(
            backoff,
            Event::ConfigureRetry {
                sensor: kind,
                retry,
            },
        ));
    }

    pub(crate) async fn on_configure_retry(&mut self, kind: SensorKind, retry: u64) {
        if self.session.state != ConnectionState::Configuring {
            return;
        }
        let sensor = self.session.sensor_mut(kind);
        if !sensor.take_retry(retry) || !sensor.is_monitored() || sensor.is_configured() {
            tracing::debug!(sensor = %kind, retry, "ignoring stale configuration retry");
            return;
        }
        self.configure_sensor(kind).await;
    }
}
