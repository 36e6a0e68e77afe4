//! Events driving the connection state machine.
//!
//! External notifications from the adapter service and internal
//! continuations (timer expiries, write completions) share one enum so the
//! monitor has a single dispatch point.

use sensortag_domain::address::DeviceAddress;
use sensortag_domain::sensor::{CharacteristicRole, SensorKind};

use crate::ports::{AdapterId, ObjectPath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A local adapter became available.
    AdapterFound { adapter: AdapterId, powered: bool },
    /// A device appeared (or was enumerated) on the adapter.
    DeviceFound {
        path: ObjectPath,
        address: DeviceAddress,
        connected: bool,
    },
    /// A device object vanished from the adapter.
    DeviceRemoved { path: ObjectPath },
    /// A device reported `Connected = true`.
    DeviceConnected { path: ObjectPath },
    /// A device reported `Connected = false`.
    DeviceDisconnected { path: ObjectPath },
    /// A device finished resolving its GATT services.
    ServicesResolved { path: ObjectPath },
    /// A characteristic write issued by the core succeeded.
    CharacteristicWriteDone {
        sensor: SensorKind,
        role: CharacteristicRole,
    },
    /// A characteristic write issued by the core failed.
    CharacteristicWriteFailed {
        sensor: SensorKind,
        role: CharacteristicRole,
    },
    /// The configuration backoff of a sensor expired. `retry` identifies
    /// the scheduled retry so one that fired before a reset is ignored.
    ConfigureRetry { sensor: SensorKind, retry: u64 },
    /// The poll interval elapsed.
    PollTick,
    /// The settle delay of a poll cycle elapsed.
    SettleElapsed { cycle: u64 },
}

impl Event {
    /// Translate a change of a device's `Connected` property.
    #[must_use]
    pub fn connection_changed(path: ObjectPath, connected: bool) -> Self {
        if connected {
            Self::DeviceConnected { path }
        } else {
            Self::DeviceDisconnected { path }
        }
    }

    /// Device the event refers to, if any.
    #[must_use]
    pub fn device_path(&self) -> Option<&ObjectPath> {
        match self {
            Self::DeviceFound { path, .. }
            | Self::DeviceRemoved { path }
            | Self::DeviceConnected { path }
            | Self::DeviceDisconnected { path }
            | Self::ServicesResolved { path } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_translate_connected_property() {
        let path = ObjectPath::new("/hci0/dev_1");
        assert_eq!(
            Event::connection_changed(path.clone(), true),
            Event::DeviceConnected { path: path.clone() }
        );
        assert_eq!(
            Event::connection_changed(path.clone(), false),
            Event::DeviceDisconnected { path }
        );
    }

    #[test]
    fn should_expose_device_path() {
        let path = ObjectPath::new("/hci0/dev_1");
        let event = Event::ServicesResolved { path: path.clone() };
        assert_eq!(event.device_path(), Some(&path));
        assert_eq!(Event::PollTick.device_path(), None);
    }
}
