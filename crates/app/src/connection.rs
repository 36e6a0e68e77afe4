//! Connection state machine: from adapter selection through discovery,
//! connection and service resolution to the hand-off to sensor
//! configuration.
//!
//! ```text
//! Idle ──AdapterFound──▶ Discovering ──DeviceFound(target)──▶ Connecting
//!                            ▲                                    │
//!                            │                          DeviceConnected
//!                     DeviceDisconnected                          ▼
//!                            │                            ServiceDiscovery
//!                            │                                    │
//!                            │                     characteristics registered
//!                            │                                    ▼
//!                            └────────── Monitoring ◀──────── Configuring
//! ```
//!
//! Every event naming a device other than the target is ignored. A
//! disconnect of the target from any state resets the session and returns
//! to discovery.

use std::fmt;

use sensortag_domain::address::DeviceAddress;

use crate::event::Event;
use crate::monitor::Monitor;
use crate::ports::{AdapterId, AdapterService, ManagedObject, MetricsSink, ObjectPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No adapter adopted yet.
    Idle,
    Discovering,
    /// Target found, connect requested.
    Connecting,
    /// Connected, waiting for the target's characteristics.
    ServiceDiscovery,
    Configuring,
    Monitoring,
}

impl ConnectionState {
    /// Whether the target is connected in this state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::ServiceDiscovery | Self::Configuring | Self::Monitoring
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Connecting => "connecting",
            Self::ServiceDiscovery => "service_discovery",
            Self::Configuring => "configuring",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<A: AdapterService, M: MetricsSink> Monitor<A, M> {
    pub(crate) async fn on_adapter_found(&mut self, adapter: AdapterId, powered: bool) {
        if self.session.adapter.is_some() {
            tracing::debug!(%adapter, "adapter already selected, ignoring");
            return;
        }
        if let Some(wanted) = &self.config.adapter
            && wanted != adapter.as_str()
        {
            tracing::debug!(%adapter, "ignoring adapter");
            return;
        }

        tracing::info!(%adapter, powered, "using adapter");
        if !powered && let Err(err) = self.adapter.set_powered(&adapter, true).await {
            tracing::warn!(%adapter, %err, "failed to power adapter on");
        }
        self.session.adapter = Some(adapter);
        self.session.state = ConnectionState::Discovering;
        self.start_discovery().await;
        self.enumerate_devices().await;
    }

    /// Queue a `DeviceFound` for every device the adapter already knows,
    /// so a target discovered before startup is not missed.
    async fn enumerate_devices(&mut self) {
        let objects = match self.adapter.list_objects().await {
            Ok(objects) => objects,
            Err(err) => {
                tracing::warn!(%err, "failed to enumerate known devices");
                return;
            }
        };
        for object in objects {
            if let ManagedObject::Device(device) = object {
                self.pending.push_back(Event::DeviceFound {
                    path: device.path,
                    address: device.address,
                    connected: device.connected,
                });
            }
        }
    }

    async fn start_discovery(&self) {
        let Some(adapter) = &self.session.adapter else {
            return;
        };
        tracing::debug!(%adapter, "starting discovery");
        if let Err(err) = self.adapter.start_discovery(adapter).await {
            tracing::warn!(%adapter, %err, "failed to start discovery");
        }
    }

    async fn stop_discovery(&self) {
        let Some(adapter) = &self.session.adapter else {
            return;
        };
        if let Err(err) = self.adapter.stop_discovery(adapter).await {
            tracing::debug!(%adapter, %err, "failed to stop discovery");
        }
    }

    pub(crate) async fn on_device_found(
        &mut self,
        path: ObjectPath,
        address: DeviceAddress,
        connected: bool,
    ) {
        if address != self.config.target {
            tracing::trace!(%path, %address, "ignoring device");
            return;
        }

        match self.session.state {
            ConnectionState::Idle | ConnectionState::Discovering => {}
            ConnectionState::Connecting if self.session.is_target(&path) => {
                if connected {
                    self.enter_service_discovery().await;
                } else if self.session.reconnect_on_sight {
                    self.session.reconnect_on_sight = false;
                    self.stop_discovery().await;
                    self.request_connect().await;
                }
                return;
            }
            ConnectionState::ServiceDiscovery if connected && self.session.is_target(&path) => {
                self.refresh_characteristics().await;
                return;
            }
            _ => return,
        }

        tracing::info!(%path, %address, "found target device");
        self.session.target = Some(path);
        self.stop_discovery().await;

        if connected {
            self.enter_service_discovery().await;
        } else {
            self.session.state = ConnectionState::Connecting;
            self.request_connect().await;
        }
    }

    /// Ask the adapter to connect the target. On failure the machine stays
    /// in `Connecting` and discovery resumes; the next sighting retries.
    async fn request_connect(&mut self) {
        let Some(path) = self.session.target.clone() else {
            return;
        };
        tracing::info!(%path, "connecting");
        if let Err(err) = self.adapter.connect(&path).await {
            tracing::warn!(%path, %err, "connect request failed");
            self.session.reconnect_on_sight = true;
            self.start_discovery().await;
        }
    }

    pub(crate) async fn on_device_connected(&mut self, path: ObjectPath) {
        if !self.session.is_target(&path) {
            return;
        }
        match self.session.state {
            ConnectionState::Idle | ConnectionState::Discovering | ConnectionState::Connecting => {
                self.enter_service_discovery().await;
            }
            state => tracing::debug!(%state, "target already connected"),
        }
    }

    async fn enter_service_discovery(&mut self) {
        if self.session.reconnect_on_sight {
            self.session.reconnect_on_sight = false;
            self.stop_discovery().await;
        }
        self.session.state = ConnectionState::ServiceDiscovery;
        tracing::info!("connected, resolving characteristics");
        self.refresh_characteristics().await;
    }

    pub(crate) async fn on_services_resolved(&mut self, path: ObjectPath) {
        if !self.session.is_target(&path) {
            return;
        }
        match self.session.state {
            ConnectionState::Connecting => self.enter_service_discovery().await,
            ConnectionState::ServiceDiscovery
            | ConnectionState::Configuring
            | ConnectionState::Monitoring => self.refresh_characteristics().await,
            state => tracing::debug!(%state, "ignoring resolved services"),
        }
    }

    /// Rebuild the registry from the adapter's object tree and move the
    /// handshake forward when enough is known.
    async fn refresh_characteristics(&mut self) {
        let Some(target) = self.session.target.clone() else {
            return;
        };
        let objects = match self.adapter.list_objects().await {
            Ok(objects) => objects,
            Err(err) => {
                tracing::warn!(%err, "failed to list characteristics");
                return;
            }
        };
        let count = self.session.registry.rebuild(&target, &objects);
        tracing::debug!(count, "characteristics registered");

        match self.session.state {
            ConnectionState::ServiceDiscovery if count > 0 => self.begin_configuration().await,
            ConnectionState::ServiceDiscovery => {
                tracing::debug!("no characteristics resolved yet");
            }
            ConnectionState::Configuring => self.start_monitoring_if_ready(),
            _ => {}
        }
    }

    pub(crate) async fn on_device_disconnected(&mut self, path: ObjectPath) {
        if !self.session.is_target(&path) {
            return;
        }
        let previous = self.session.state;
        self.session.reset();
        if previous != ConnectionState::Discovering {
            tracing::info!(%path, %previous, "target disconnected, rediscovering");
            self.start_discovery().await;
        }
    }

    pub(crate) async fn on_device_removed(&mut self, path: ObjectPath) {
        if !self.session.is_target(&path) {
            return;
        }
        tracing::info!(%path, "target device removed");
        let previous = self.session.state;
        self.session.reset();
        self.session.target = None;
        if previous != ConnectionState::Discovering {
            self.start_discovery().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sensortag_domain::sensor::{CharacteristicRole, SensorKind};

    use super::*;
    use crate::testing::{self, Call, FakeAdapter, RecordingSink};

    fn monitor(
        adapter: &Arc<FakeAdapter>,
    ) -> Monitor<Arc<FakeAdapter>, Arc<RecordingSink>> {
        testing::monitor(adapter.clone(), Arc::new(RecordingSink::default()))
    }

    #[test]
    fn should_only_report_connected_states() {
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::ServiceDiscovery.is_connected());
        assert!(ConnectionState::Monitoring.is_connected());
        assert_eq!(ConnectionState::ServiceDiscovery.to_string(), "service_discovery");
    }

    #[tokio::test(start_paused = true)]
    async fn should_connect_to_target_found_at_startup() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();

        assert_eq!(monitor.state(), ConnectionState::Connecting);
        assert_eq!(monitor.session().target(), Some(&testing::target_path()));
        let calls = adapter.calls();
        assert!(calls.contains(&Call::StartDiscovery));
        assert!(calls.contains(&Call::StopDiscovery));
        assert!(calls.contains(&Call::Connect(testing::target_path())));
        assert!(!calls.contains(&Call::Connect(testing::foreign_path())));
    }

    #[tokio::test(start_paused = true)]
    async fn should_power_on_unpowered_adapter() {
        let adapter = Arc::new(FakeAdapter::sensortag().unpowered());
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();

        assert_eq!(adapter.calls()[0], Call::SetPowered(true));
        assert_eq!(monitor.session().adapter().map(AdapterId::as_str), Some("hci0"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_connect_when_already_connected() {
        let adapter = Arc::new(FakeAdapter::sensortag().already_connected());
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();

        assert!(
            !adapter
                .calls()
                .iter()
                .any(|call| matches!(call, Call::Connect(_)))
        );
        assert_eq!(monitor.state(), ConnectionState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_events_for_other_devices() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut monitor = testing::monitoring(adapter, Arc::new(RecordingSink::default())).await;

        for event in [
            Event::DeviceDisconnected {
                path: testing::foreign_path(),
            },
            Event::DeviceRemoved {
                path: testing::foreign_path(),
            },
            Event::ServicesResolved {
                path: testing::foreign_path(),
            },
        ] {
            monitor.dispatch(event).await;
        }

        assert_eq!(monitor.state(), ConnectionState::Monitoring);
        assert!(monitor.session().all_configured());
    }

    #[tokio::test(start_paused = true)]
    async fn should_reset_on_disconnect_from_any_state() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut monitor = testing::monitoring(adapter.clone(), Arc::new(RecordingSink::default())).await;

        monitor
            .dispatch(Event::DeviceDisconnected {
                path: testing::target_path(),
            })
            .await;
        monitor
            .dispatch(Event::DeviceDisconnected {
                path: testing::target_path(),
            })
            .await;

        let session = monitor.session();
        assert_eq!(session.state(), ConnectionState::Discovering);
        assert!(session.registry().is_empty());
        assert!(!session.sensor(SensorKind::Luxometer).is_configured());
        assert!(!session.poll().is_running());

        let discoveries = adapter
            .calls()
            .into_iter()
            .filter(|call| *call == Call::StartDiscovery)
            .count();
        assert_eq!(discoveries, 2, "startup plus one rediscovery");
    }

    #[tokio::test(start_paused = true)]
    async fn should_reconnect_after_rediscovery() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut monitor = testing::monitoring(adapter.clone(), Arc::new(RecordingSink::default())).await;

        monitor
            .dispatch(Event::DeviceDisconnected {
                path: testing::target_path(),
            })
            .await;
        monitor
            .dispatch(Event::DeviceFound {
                path: testing::target_path(),
                address: testing::target_address(),
                connected: false,
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::Connecting);

        monitor
            .dispatch(Event::DeviceConnected {
                path: testing::target_path(),
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_for_characteristics_before_configuring() {
        let adapter = Arc::new(FakeAdapter::sensortag().without_characteristics());
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();
        monitor
            .dispatch(Event::DeviceConnected {
                path: testing::target_path(),
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::ServiceDiscovery);
        assert!(monitor.session().registry().is_empty());

        adapter.restore_characteristics();
        monitor
            .dispatch(Event::ServicesResolved {
                path: testing::target_path(),
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn should_enumerate_again_when_connected_target_is_seen() {
        let adapter = Arc::new(
            FakeAdapter::sensortag()
                .already_connected()
                .without_characteristics(),
        );
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();
        assert_eq!(monitor.state(), ConnectionState::ServiceDiscovery);
        assert!(monitor.session().registry().is_empty());

        adapter.restore_characteristics();
        monitor
            .dispatch(Event::DeviceFound {
                path: testing::target_path(),
                address: testing::target_address(),
                connected: true,
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_configuring_until_registry_complete() {
        let missing = testing::char_path(SensorKind::Luxometer, CharacteristicRole::Data);
        let adapter = Arc::new(FakeAdapter::sensortag().without_characteristic(&missing));
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();
        monitor
            .dispatch(Event::DeviceConnected {
                path: testing::target_path(),
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::Configuring);
        assert!(monitor.session().all_configured());
        assert!(!monitor.session().ready_to_poll());
        assert!(!monitor.session().poll().is_running());

        adapter.restore_characteristics();
        monitor
            .dispatch(Event::ServicesResolved {
                path: testing::target_path(),
            })
            .await;
        assert_eq!(monitor.state(), ConnectionState::Monitoring);
        assert!(monitor.session().poll().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_connect_when_target_reappears() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        adapter.fail_connects(1);
        let mut monitor = monitor(&adapter);

        monitor.start().await.unwrap();
        assert_eq!(monitor.state(), ConnectionState::Connecting);

        let found = Event::DeviceFound {
            path: testing::target_path(),
            address: testing::target_address(),
            connected: false,
        };
        monitor.dispatch(found.clone()).await;
        monitor.dispatch(found).await;

        let connects = adapter
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Connect(_)))
            .count();
        assert_eq!(connects, 2, "one retry per failed attempt");
        assert_eq!(monitor.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn should_forget_removed_target() {
        let adapter = Arc::new(FakeAdapter::sensortag());
        let mut monitor = testing::monitoring(adapter, Arc::new(RecordingSink::default())).await;

        monitor
            .dispatch(Event::DeviceRemoved {
                path: testing::target_path(),
            })
            .await;

        assert_eq!(monitor.state(), ConnectionState::Discovering);
        assert!(monitor.session().target().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_select_configured_adapter() {
        let adapter = Arc::new(FakeAdapter::sensortag().with_adapter("hci1"));
        let mut config = testing::config();
        config.adapter = Some("hci1".to_string());
        let mut monitor = Monitor::new(config, adapter, Arc::new(RecordingSink::default()));

        monitor.start().await.unwrap();

        assert_eq!(monitor.session().adapter().map(AdapterId::as_str), Some("hci1"));
    }
}
