//! Adapter service port: the Bluetooth stack as seen by the core.
//!
//! The stack is modelled as a tree of managed objects (adapters, devices,
//! GATT characteristics) addressed by [`ObjectPath`]. Characteristic paths
//! double as the handles used for reads and writes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use sensortag_domain::address::DeviceAddress;
use sensortag_domain::error::SensorTagError;

/// Path of an object in the adapter's object tree
/// (e.g. `/org/bluez/hci0/dev_B0_B4_48_C9_4A_05`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the path of a direct child object.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{segment}", self.0))
    }

    /// Whether this object lives below `ancestor` in the tree.
    ///
    /// Matches whole segments only, so `/hci0/dev_1` is not an ancestor of
    /// `/hci0/dev_10/service1`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &ObjectPath) -> bool {
        self.0
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a local radio adapter (e.g. `hci0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterId(String);

impl AdapterId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local radio adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub id: AdapterId,
    pub powered: bool,
}

/// A remote device known to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceObject {
    pub path: ObjectPath,
    pub address: DeviceAddress,
    pub connected: bool,
}

/// A GATT characteristic of a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicObject {
    /// Path of the characteristic, also its read/write handle.
    pub path: ObjectPath,
    pub uuid: uuid::Uuid,
    /// Path of the owning GATT service.
    pub service: ObjectPath,
}

/// One entry of the adapter's object tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedObject {
    Adapter(AdapterInfo),
    Device(DeviceObject),
    Characteristic(CharacteristicObject),
}

/// The Bluetooth stack.
///
/// Every operation may fail with [`SensorTagError::Transport`]. The core
/// treats those failures as recoverable and never imposes its own timeout:
/// implementations are expected to bound their calls.
pub trait AdapterService: Send + Sync {
    /// List local radio adapters.
    fn list_adapters(
        &self,
    ) -> impl Future<Output = Result<Vec<AdapterInfo>, SensorTagError>> + Send;

    /// Power an adapter on or off.
    fn set_powered(
        &self,
        adapter: &AdapterId,
        powered: bool,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;

    /// Start scanning for devices.
    fn start_discovery(
        &self,
        adapter: &AdapterId,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;

    /// Stop scanning for devices.
    fn stop_discovery(
        &self,
        adapter: &AdapterId,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;

    /// Enumerate the object tree: adapters, devices and the characteristics
    /// of connected devices.
    fn list_objects(
        &self,
    ) -> impl Future<Output = Result<Vec<ManagedObject>, SensorTagError>> + Send;

    /// Request a connection to a device.
    fn connect(&self, device: &ObjectPath)
    -> impl Future<Output = Result<(), SensorTagError>> + Send;

    /// Request a disconnection from a device.
    fn disconnect(
        &self,
        device: &ObjectPath,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;

    /// Read the value of a characteristic.
    fn read_value(
        &self,
        characteristic: &ObjectPath,
    ) -> impl Future<Output = Result<Vec<u8>, SensorTagError>> + Send;

    /// Write the value of a characteristic.
    fn write_value(
        &self,
        characteristic: &ObjectPath,
        value: &[u8],
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send;
}

impl<T: AdapterService> AdapterService for Arc<T> {
    fn list_adapters(
        &self,
    ) -> impl Future<Output = Result<Vec<AdapterInfo>, SensorTagError>> + Send {
        (**self).list_adapters()
    }

    fn set_powered(
        &self,
        adapter: &AdapterId,
        powered: bool,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).set_powered(adapter, powered)
    }

    fn start_discovery(
        &self,
        adapter: &AdapterId,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).start_discovery(adapter)
    }

    fn stop_discovery(
        &self,
        adapter: &AdapterId,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).stop_discovery(adapter)
    }

    fn list_objects(
        &self,
    ) -> impl Future<Output = Result<Vec<ManagedObject>, SensorTagError>> + Send {
        (**self).list_objects()
    }

    fn connect(
        &self,
        device: &ObjectPath,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).connect(device)
    }

    fn disconnect(
        &self,
        device: &ObjectPath,
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).disconnect(device)
    }

    fn read_value(
        &self,
        characteristic: &ObjectPath,
    ) -> impl Future<Output = Result<Vec<u8>, SensorTagError>> + Send {
        (**self).read_value(characteristic)
    }

    fn write_value(
        &self,
        characteristic: &ObjectPath,
        value: &[u8],
    ) -> impl Future<Output = Result<(), SensorTagError>> + Send {
        (**self).write_value(characteristic, value)
    }
}
