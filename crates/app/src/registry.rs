//! Characteristic registry: live handles of the target's GATT
//! characteristics, keyed by UUID.
//!
//! Handles are not stable across reconnects, so the registry is rebuilt from
//! scratch on every service-discovery pass and cleared on disconnect.

use std::collections::HashMap;

use sensortag_domain::sensor::{CharacteristicRole, SensorKind};
use uuid::Uuid;

use crate::ports::{ManagedObject, ObjectPath};

#[derive(Debug, Default)]
pub struct CharacteristicRegistry {
    handles: HashMap<Uuid, ObjectPath>,
}

impl CharacteristicRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content with every characteristic of `objects` whose
    /// owning service belongs to `device`. Returns the number registered.
    pub fn rebuild(&mut self, device: &ObjectPath, objects: &[ManagedObject]) -> usize {
        self.handles.clear();
        for object in objects {
            let ManagedObject::Characteristic(characteristic) = object else {
                continue;
            };
            if !characteristic.service.is_descendant_of(device) {
                continue;
            }
            tracing::debug!(
                uuid = %characteristic.uuid,
                path = %characteristic.path,
                "found characteristic"
            );
            self.handles
                .insert(characteristic.uuid, characteristic.path.clone());
        }
        self.handles.len()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Handle of the characteristic with `uuid`.
    #[must_use]
    pub fn get(&self, uuid: &Uuid) -> Option<&ObjectPath> {
        self.handles.get(uuid)
    }

    /// Handle of the characteristic playing `role` for `sensor`.
    #[must_use]
    pub fn lookup(&self, sensor: SensorKind, role: CharacteristicRole) -> Option<&ObjectPath> {
        self.get(&sensor.descriptor().uuid(role))
    }

    /// Whether data, config and period characteristics of `sensor` are all present.
    #[must_use]
    pub fn is_complete_for(&self, sensor: SensorKind) -> bool {
        CharacteristicRole::ALL
            .into_iter()
            .all(|role| self.lookup(sensor, role).is_some())
    }
}
