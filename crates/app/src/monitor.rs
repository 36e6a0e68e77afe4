//! The monitor: owns the session and runs the single event loop.
//!
//! Adapter notifications and timer continuations are merged into one
//! stream of [`Event`]s and handled strictly one at a time, so no two
//! handlers ever observe or mutate the session concurrently. Handlers may
//! queue follow-up events (write completions, enumerated devices); those are
//! drained before the next external event is taken.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use sensortag_domain::address::DeviceAddress;
use sensortag_domain::error::{NotFoundError, SensorTagError};
use sensortag_domain::metrics::MetricsSchema;
use sensortag_domain::sensor::SensorKind;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};

use crate::connection::ConnectionState;
use crate::event::Event;
use crate::ports::{AdapterService, MetricsSink};
use crate::session::Session;
use crate::timer::Timers;

/// Default time between two poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);
/// Default wait between enabling the sensors and reading them.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1500);
/// Default wait before retrying a failed period write.
pub const DEFAULT_CONFIGURE_BACKOFF: Duration = Duration::from_secs(1);

/// Runtime parameters of a [`Monitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Hardware address of the tag to monitor.
    pub target: DeviceAddress,
    /// Adapter to use; the first one reported when `None`.
    pub adapter: Option<String>,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub configure_backoff: Duration,
    /// Sensors to configure and poll.
    pub sensors: Vec<SensorKind>,
}

impl MonitorConfig {
    #[must_use]
    pub fn new(target: DeviceAddress) -> Self {
        Self {
            target,
            adapter: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            configure_backoff: DEFAULT_CONFIGURE_BACKOFF,
            sensors: SensorKind::ALL.to_vec(),
        }
    }
}

pub struct Monitor<A, M> {
    pub(crate) config: MonitorConfig,
    pub(crate) adapter: A,
    pub(crate) sink: M,
    pub(crate) session: Session,
    pub(crate) timers: Timers,
    timer_events: mpsc::UnboundedReceiver<Event>,
    pub(crate) pending: VecDeque<Event>,
}

impl<A: AdapterService, M: MetricsSink> Monitor<A, M> {
    pub fn new(config: MonitorConfig, adapter: A, sink: M) -> Self {
        let (timers, timer_events) = Timers::channel();
        let session = Session::new(&config.sensors);
        Self {
            config,
            adapter,
            sink,
            session,
            timers,
            timer_events,
            pending: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// Make sure the sink holds the storage layout matching the poll interval.
    ///
    /// # Errors
    ///
    /// Returns the sink's error; the monitor cannot run without storage.
    pub async fn prepare_sink(&self) -> Result<(), SensorTagError> {
        let schema = MetricsSchema::for_sensors(self.config.poll_interval);
        self.sink.ensure_schema(&schema).await
    }

    /// Look up the local adapters and adopt one.
    ///
    /// # Errors
    ///
    /// Returns an error if adapters cannot be listed or none matches the
    /// configured selection.
    pub async fn start(&mut self) -> Result<(), SensorTagError> {
        let adapters = self.adapter.list_adapters().await?;
        let matching = adapters.iter().any(|info| {
            self.config
                .adapter
                .as_deref()
                .is_none_or(|wanted| wanted == info.id.as_str())
        });
        if !matching {
            return Err(NotFoundError {
                kind: "adapter",
                id: self.config.adapter.clone().unwrap_or_else(|| "any".into()),
            }
            .into());
        }

        tracing::info!(device = %self.config.target, "starting monitor");
        for info in adapters {
            self.pending.push_back(Event::AdapterFound {
                adapter: info.id,
                powered: info.powered,
            });
        }
        self.drain().await;
        Ok(())
    }

    /// Handle `event` and every follow-up event it produces.
    pub async fn dispatch(&mut self, event: Event) {
        self.pending.push_back(event);
        self.drain().await;
    }

    async fn drain(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            tracing::trace!(
                ?event,
                device = ?event.device_path(),
                state = %self.session.state,
                "handling event"
            );
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::AdapterFound { adapter, powered } => {
                self.on_adapter_found(adapter, powered).await;
            }
            Event::DeviceFound {
                path,
                address,
                connected,
            } => self.on_device_found(path, address, connected).await,
            Event::DeviceRemoved { path } => self.on_device_removed(path).await,
            Event::DeviceConnected { path } => self.on_device_connected(path).await,
            Event::DeviceDisconnected { path } => self.on_device_disconnected(path).await,
            Event::ServicesResolved { path } => self.on_services_resolved(path).await,
            Event::CharacteristicWriteDone { sensor, role } => self.on_write_done(sensor, role),
            Event::CharacteristicWriteFailed { sensor, role } => {
                self.on_write_failed(sensor, role);
            }
            Event::ConfigureRetry { sensor, retry } => {
                self.on_configure_retry(sensor, retry).await;
            }
            Event::PollTick => self.on_poll_tick().await,
            Event::SettleElapsed { cycle } => self.on_settle_elapsed(cycle).await,
        }
    }

    /// Wait for the next timer continuation.
    pub async fn next_continuation(&mut self) -> Option<Event> {
        self.timer_events.recv().await
    }

    /// Run until `shutdown` resolves or the adapter event stream ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be prepared or no adapter is
    /// available. Failures after startup are logged and recovered from.
    pub async fn run<S, F>(mut self, mut events: S, shutdown: F) -> Result<(), SensorTagError>
    where
        S: Stream<Item = Event> + Unpin,
        F: Future<Output = ()>,
    {
        self.prepare_sink().await?;
        self.start().await?;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        tracing::warn!("adapter event stream closed");
                        break;
                    }
                },
                Some(event) = self.timer_events.recv() => self.dispatch(event).await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Cancel every timer and disconnect the target if it is connected.
    pub async fn shutdown(&mut self) {
        let state = self.session.state;
        if let Some(path) = self.session.target.clone()
            && (state.is_connected() || state == ConnectionState::Connecting)
        {
            tracing::info!(%path, "disconnecting");
            if let Err(err) = self.adapter.disconnect(&path).await {
                tracing::warn!(%path, %err, "failed to disconnect");
            }
        }
        self.session.reset();
        self.session.state = ConnectionState::Idle;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{self, Call, FakeAdapter, RecordingSink};

    #[test]
    fn should_default_to_every_sensor() {
        let config = MonitorConfig::new(testing::target_address());
        assert_eq!(config.poll_interval, Duration::from_secs(120));
        assert_eq!(config.sensors, SensorKind::ALL.to_vec());
        assert!(config.adapter.is_none());
    }

    #[tokio::test]
    async fn should_fail_to_start_without_adapter() {
        let adapter = Arc::new(FakeAdapter::default());
        let mut monitor = testing::monitor(adapter, Arc::new(RecordingSink::default()));

        let err = monitor.start().await.unwrap_err();
        assert!(matches!(err, SensorTagError::NotFound(_)));
        assert_eq!(monitor.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn should_fail_to_start_with_unknown_adapter() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut config = testing::config();
        config.adapter = Some("hci7".into());
        let mut monitor = Monitor::new(config, adapter, Arc::new(RecordingSink::default()));

        assert!(monitor.start().await.is_err());
    }

    #[tokio::test]
    async fn should_prepare_schema_for_poll_interval() {
        let sink = Arc::new(RecordingSink::default());
        let monitor = testing::monitor(Arc::new(FakeAdapter::sensortag()), sink.clone());

        monitor.prepare_sink().await.unwrap();

        let schemas = sink.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].step, Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn should_disconnect_on_shutdown() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut monitor = testing::monitoring(adapter.clone(), Arc::new(RecordingSink::default())).await;

        monitor.shutdown().await;

        assert!(adapter.calls().contains(&Call::Disconnect(testing::target_path())));
        assert_eq!(monitor.state(), ConnectionState::Idle);
        assert!(!monitor.session().poll().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_until_shutdown() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let sink = Arc::new(RecordingSink::default());
        let monitor = testing::monitor(adapter.clone(), sink.clone());
        let events = tokio_stream::iter(vec![Event::DeviceConnected {
            path: testing::target_path(),
        }])
        .chain(tokio_stream::pending());

        monitor
            .run(
                Box::pin(events),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await
            .unwrap();

        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.schemas().len(), 1);
        assert_eq!(adapter.calls().last(), Some(&Call::Disconnect(testing::target_path())));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_when_event_stream_ends() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let monitor = testing::monitor(adapter, Arc::new(RecordingSink::default()));

        monitor
            .run(tokio_stream::empty(), std::future::pending())
            .await
            .unwrap();
    }
}
