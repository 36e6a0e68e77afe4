//! The session aggregate: all mutable monitoring state, owned by the
//! monitor and reset as one unit when the target disconnects.

use sensortag_domain::sensor::SensorKind;

use crate::connection::ConnectionState;
use crate::poll::PollScheduler;
use crate::ports::{AdapterId, ObjectPath};
use crate::registry::CharacteristicRegistry;
use crate::sensor_controller::SensorController;

#[derive(Debug)]
pub struct Session {
    pub(crate) state: ConnectionState,
    pub(crate) adapter: Option<AdapterId>,
    pub(crate) target: Option<ObjectPath>,
    pub(crate) registry: CharacteristicRegistry,
    pub(crate) sensors: [SensorController; SensorKind::COUNT],
    pub(crate) poll: PollScheduler,
    /// Set after a failed connect request; the next sighting of the target
    /// issues a new one.
    pub(crate) reconnect_on_sight: bool,
}

impl Session {
    /// Start an idle session monitoring the sensors in `monitored`.
    #[must_use]
    pub fn new(monitored: &[SensorKind]) -> Self {
        Self {
            state: ConnectionState::Idle,
            adapter: None,
            target: None,
            registry: CharacteristicRegistry::new(),
            sensors: SensorKind::ALL
                .map(|kind| SensorController::new(kind, monitored.contains(&kind))),
            poll: PollScheduler::default(),
            reconnect_on_sight: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn adapter(&self) -> Option<&AdapterId> {
        self.adapter.as_ref()
    }

    /// Object path of the target device once it has been seen.
    #[must_use]
    pub fn target(&self) -> Option<&ObjectPath> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn registry(&self) -> &CharacteristicRegistry {
        &self.registry
    }

    #[must_use]
    pub fn sensor(&self, kind: SensorKind) -> &SensorController {
        &self.sensors[kind.index()]
    }

    pub(crate) fn sensor_mut(&mut self, kind: SensorKind) -> &mut SensorController {
        &mut self.sensors[kind.index()]
    }

    /// Kinds of the monitored sensors, in table order.
    #[must_use]
    pub fn monitored(&self) -> Vec<SensorKind> {
        self.sensors
            .iter()
            .filter(|sensor| sensor.is_monitored())
            .map(SensorController::kind)
            .collect()
    }

    #[must_use]
    pub fn poll(&self) -> &PollScheduler {
        &self.poll
    }

    /// Whether `path` is the target device.
    #[must_use]
    pub fn is_target(&self, path: &ObjectPath) -> bool {
        self.target.as_ref() == Some(path)
    }

    /// Whether every monitored sensor finished its configuration handshake.
    #[must_use]
    pub fn all_configured(&self) -> bool {
        let mut monitored = self.sensors.iter().filter(|s| s.is_monitored()).peekable();
        monitored.peek().is_some() && monitored.all(SensorController::is_configured)
    }

    /// Whether a poll cycle may run: every monitored sensor is configured
    /// and all of its characteristics are registered.
    #[must_use]
    pub fn ready_to_poll(&self) -> bool {
        self.all_configured()
            && self
                .monitored()
                .into_iter()
                .all(|kind| self.registry.is_complete_for(kind))
    }

    /// Forget everything learned from the current connection and go back
    /// to discovering. Idempotent.
    pub(crate) fn reset(&mut self) {
        self.state = ConnectionState::Discovering;
        self.registry.clear();
        for sensor in &mut self.sensors {
            sensor.reset();
        }
        self.poll.stop();
        self.reconnect_on_sight = false;
    }
}
