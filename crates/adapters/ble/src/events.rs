//! Translation of btleplug central events into core [`Event`]s.
//!
//! One forwarder task runs per adapter. Service discovery is started as
//! soon as a device connects, or when a device is seen already connected
//! without any known characteristic (e.g. connected before the daemon
//! started). It is reported with `ServicesResolved` once btleplug has
//! populated the characteristics.

use std::pin::Pin;
use std::time::Duration;

use btleplug::api::{BDAddr, Central as _, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt as _};

use sensortag_app::event::Event;
use sensortag_app::ports::ObjectPath;

use crate::paths;

/// What happened to a device, as seen by the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceChange {
    Seen { connected: bool },
    Connected,
    Disconnected,
}

/// Core event for `change` on the device with `address` under `adapter`.
pub(crate) fn device_event(adapter: &ObjectPath, address: BDAddr, change: DeviceChange) -> Event {
    let path = paths::device_path(adapter, address);
    match change {
        DeviceChange::Seen { connected } => Event::DeviceFound {
            path,
            address: paths::device_address(address),
            connected,
        },
        DeviceChange::Connected => Event::DeviceConnected { path },
        DeviceChange::Disconnected => Event::DeviceDisconnected { path },
    }
}

/// Whether `change` calls for a GATT service discovery, given how many
/// characteristics btleplug already knows for the device.
pub(crate) fn needs_service_discovery(change: DeviceChange, known_characteristics: usize) -> bool {
    match change {
        DeviceChange::Connected => true,
        DeviceChange::Seen { connected } => connected && known_characteristics == 0,
        DeviceChange::Disconnected => false,
    }
}

pub(crate) type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Forward the events of one adapter until the stream ends or the receiver
/// is dropped.
pub(crate) async fn forward(
    central: Adapter,
    adapter: ObjectPath,
    mut events: CentralEvents,
    tx: mpsc::Sender<Event>,
    timeout: Duration,
) {
    while let Some(event) = events.next().await {
        let (id, change) = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                (id, None)
            }
            CentralEvent::DeviceConnected(id) => (id, Some(DeviceChange::Connected)),
            CentralEvent::DeviceDisconnected(id) => (id, Some(DeviceChange::Disconnected)),
            _ => continue,
        };

        let peripheral = match central.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(err) => {
                tracing::debug!(%err, "event for unknown peripheral");
                continue;
            }
        };
        let change = match change {
            Some(change) => change,
            None => DeviceChange::Seen {
                connected: peripheral.is_connected().await.unwrap_or(false),
            },
        };

        let event = device_event(&adapter, peripheral.address(), change);
        tracing::trace!(?event, "central event");
        if tx.send(event).await.is_err() {
            break;
        }

        if needs_service_discovery(change, peripheral.characteristics().len()) {
            let path = paths::device_path(&adapter, peripheral.address());
            tokio::spawn(resolve_services(peripheral, path, tx.clone(), timeout));
        }
    }
    tracing::debug!(%adapter, "central event stream ended");
}

async fn resolve_services(
    peripheral: Peripheral,
    path: ObjectPath,
    tx: mpsc::Sender<Event>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, peripheral.discover_services()).await {
        Ok(Ok(())) => {
            tracing::debug!(%path, "services resolved");
            let _ = tx.send(Event::ServicesResolved { path }).await;
        }
        Ok(Err(err)) => tracing::warn!(%path, %err, "service discovery failed"),
        Err(_) => tracing::warn!(%path, ?timeout, "service discovery timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensortag_app::ports::AdapterId;

    fn adapter() -> ObjectPath {
        paths::adapter_path(&AdapterId::new("hci0"))
    }

    fn tag() -> BDAddr {
        BDAddr::from([0xB0, 0xB4, 0x48, 0xC9, 0x4A, 0x05])
    }

    #[test]
    fn should_report_seen_device_with_address() {
        let event = device_event(&adapter(), tag(), DeviceChange::Seen { connected: true });
        assert_eq!(
            event,
            Event::DeviceFound {
                path: ObjectPath::new("/org/bluez/hci0/dev_B0_B4_48_C9_4A_05"),
                address: "B0:B4:48:C9:4A:05".parse().unwrap(),
                connected: true,
            }
        );
    }

    #[test]
    fn should_report_connection_changes_on_device_path() {
        let connected = device_event(&adapter(), tag(), DeviceChange::Connected);
        let disconnected = device_event(&adapter(), tag(), DeviceChange::Disconnected);
        let path = paths::device_path(&adapter(), tag());

        assert_eq!(connected, Event::connection_changed(path.clone(), true));
        assert_eq!(disconnected, Event::connection_changed(path, false));
    }

    #[test]
    fn should_resolve_services_on_connect() {
        assert!(needs_service_discovery(DeviceChange::Connected, 0));
        assert!(needs_service_discovery(DeviceChange::Connected, 12));
    }

    #[test]
    fn should_resolve_services_of_device_seen_connected_without_characteristics() {
        assert!(needs_service_discovery(
            DeviceChange::Seen { connected: true },
            0
        ));
        assert!(!needs_service_discovery(
            DeviceChange::Seen { connected: true },
            12
        ));
    }

    #[test]
    fn should_not_resolve_services_of_absent_device() {
        assert!(!needs_service_discovery(
            DeviceChange::Seen { connected: false },
            0
        ));
        assert!(!needs_service_discovery(DeviceChange::Disconnected, 0));
    }
}
