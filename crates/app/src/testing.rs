//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sensortag_domain::address::DeviceAddress;
use sensortag_domain::error::{NotFoundError, SensorTagError};
use sensortag_domain::metrics::MetricsSchema;
use sensortag_domain::reading::ReadingBatch;
use sensortag_domain::sensor::{CharacteristicRole, SensorKind};

use crate::connection::ConnectionState;
use crate::event::Event;
use crate::monitor::{Monitor, MonitorConfig};
use crate::ports::{
    AdapterId, AdapterInfo, AdapterService, CharacteristicObject, DeviceObject, ManagedObject,
    MetricsSink, ObjectPath,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetPowered(bool),
    StartDiscovery,
    StopDiscovery,
    Connect(ObjectPath),
    Disconnect(ObjectPath),
    Read(ObjectPath),
    Write(ObjectPath, Vec<u8>),
}

#[derive(Debug, Default)]
struct State {
    adapters: Vec<AdapterInfo>,
    objects: Vec<ManagedObject>,
    hide_characteristics: bool,
    hidden: Vec<ObjectPath>,
    values: HashMap<ObjectPath, Vec<u8>>,
    write_failures: HashMap<ObjectPath, usize>,
    read_failures: Vec<ObjectPath>,
    connect_failures: usize,
    calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct FakeAdapter {
    state: Mutex<State>,
}

pub fn target_address() -> DeviceAddress {
    DeviceAddress::new([0xB0, 0xB4, 0x48, 0xC9, 0x4A, 0x05])
}

pub fn target_path() -> ObjectPath {
    ObjectPath::new("/org/bluez/hci0/dev_B0_B4_48_C9_4A_05")
}

pub fn foreign_path() -> ObjectPath {
    ObjectPath::new("/org/bluez/hci0/dev_11_22_33_44_55_66")
}

fn service_path(kind: SensorKind) -> ObjectPath {
    match kind {
        SensorKind::HumidityTemperature => target_path().child("service0028"),
        SensorKind::Luxometer => target_path().child("service0040"),
    }
}

pub fn char_path(kind: SensorKind, role: CharacteristicRole) -> ObjectPath {
    service_path(kind).child(&format!("char_{role}"))
}

pub fn config() -> MonitorConfig {
    MonitorConfig::new(target_address())
}

fn transport_error(message: &str) -> SensorTagError {
    SensorTagError::Transport(Box::new(std::io::Error::other(message.to_string())))
}

impl FakeAdapter {
    /// One powered adapter, the target tag with both sensors and an
    /// unrelated device exposing a luxometer-like characteristic.
    pub fn sensortag() -> Self {
        let mut state = State {
            adapters: vec![AdapterInfo {
                id: AdapterId::new("hci0"),
                powered: true,
            }],
            ..State::default()
        };
        state.objects.push(ManagedObject::Device(DeviceObject {
            path: foreign_path(),
            address: DeviceAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            connected: false,
        }));
        state.objects.push(ManagedObject::Device(DeviceObject {
            path: target_path(),
            address: target_address(),
            connected: false,
        }));
        for kind in SensorKind::ALL {
            for role in CharacteristicRole::ALL {
                state
                    .objects
                    .push(ManagedObject::Characteristic(CharacteristicObject {
                        path: char_path(kind, role),
                        uuid: kind.descriptor().uuid(role),
                        service: service_path(kind),
                    }));
            }
        }
        let foreign_service = foreign_path().child("service0040");
        state
            .objects
            .push(ManagedObject::Characteristic(CharacteristicObject {
                path: foreign_service.child("char_data"),
                uuid: SensorKind::Luxometer
                    .descriptor()
                    .uuid(CharacteristicRole::Data),
                service: foreign_service,
            }));

        state.values.insert(
            char_path(SensorKind::HumidityTemperature, CharacteristicRole::Data),
            vec![0x00, 0x80, 0x00, 0x80],
        );
        state.values.insert(
            char_path(SensorKind::Luxometer, CharacteristicRole::Data),
            vec![0x64, 0x20],
        );
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn unpowered(self) -> Self {
        for adapter in &mut self.lock().adapters {
            adapter.powered = false;
        }
        self
    }

    pub fn already_connected(self) -> Self {
        for object in &mut self.lock().objects {
            if let ManagedObject::Device(device) = object
                && device.path == target_path()
            {
                device.connected = true;
            }
        }
        self
    }

    pub fn with_adapter(self, id: &str) -> Self {
        self.lock().adapters.push(AdapterInfo {
            id: AdapterId::new(id),
            powered: true,
        });
        self
    }

    pub fn without_characteristics(self) -> Self {
        self.lock().hide_characteristics = true;
        self
    }

    pub fn without_characteristic(self, path: &ObjectPath) -> Self {
        self.lock().hidden.push(path.clone());
        self
    }

    pub fn restore_characteristics(&self) {
        let mut state = self.lock();
        state.hide_characteristics = false;
        state.hidden.clear();
    }

    pub fn fail_writes(&self, path: &ObjectPath, count: usize) {
        self.lock().write_failures.insert(path.clone(), count);
    }

    pub fn fail_reads(&self, path: &ObjectPath) {
        self.lock().read_failures.push(path.clone());
    }

    pub fn fail_connects(&self, count: usize) {
        self.lock().connect_failures = count;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

impl AdapterService for FakeAdapter {
    async fn list_adapters(&self) -> Result<Vec<AdapterInfo>, SensorTagError> {
        Ok(self.lock().adapters.clone())
    }

    async fn set_powered(&self, _adapter: &AdapterId, powered: bool) -> Result<(), SensorTagError> {
        self.record(Call::SetPowered(powered));
        Ok(())
    }

    async fn start_discovery(&self, _adapter: &AdapterId) -> Result<(), SensorTagError> {
        self.record(Call::StartDiscovery);
        Ok(())
    }

    async fn stop_discovery(&self, _adapter: &AdapterId) -> Result<(), SensorTagError> {
        self.record(Call::StopDiscovery);
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ManagedObject>, SensorTagError> {
        let state = self.lock();
        Ok(state
            .objects
            .iter()
            .filter(|object| match object {
                ManagedObject::Characteristic(characteristic) => {
                    !state.hide_characteristics && !state.hidden.contains(&characteristic.path)
                }
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn connect(&self, device: &ObjectPath) -> Result<(), SensorTagError> {
        let mut state = self.lock();
        state.calls.push(Call::Connect(device.clone()));
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(transport_error("connection refused"));
        }
        Ok(())
    }

    async fn disconnect(&self, device: &ObjectPath) -> Result<(), SensorTagError> {
        self.record(Call::Disconnect(device.clone()));
        Ok(())
    }

    async fn read_value(&self, characteristic: &ObjectPath) -> Result<Vec<u8>, SensorTagError> {
        let mut state = self.lock();
        state.calls.push(Call::Read(characteristic.clone()));
        if state.read_failures.contains(characteristic) {
            return Err(transport_error("read failed"));
        }
        state.values.get(characteristic).cloned().ok_or_else(|| {
            NotFoundError {
                kind: "characteristic",
                id: characteristic.to_string(),
            }
            .into()
        })
    }

    async fn write_value(
        &self,
        characteristic: &ObjectPath,
        value: &[u8],
    ) -> Result<(), SensorTagError> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::Write(characteristic.clone(), value.to_vec()));
        if let Some(remaining) = state.write_failures.get_mut(characteristic)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(transport_error("write failed"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    schemas: Mutex<Vec<MetricsSchema>>,
    batches: Mutex<Vec<ReadingBatch>>,
}

impl RecordingSink {
    pub fn schemas(&self) -> Vec<MetricsSchema> {
        self.schemas.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<ReadingBatch> {
        self.batches.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingSink {
    async fn ensure_schema(&self, schema: &MetricsSchema) -> Result<(), SensorTagError> {
        self.schemas.lock().unwrap().push(schema.clone());
        Ok(())
    }

    async fn publish(&self, batch: &ReadingBatch) -> Result<(), SensorTagError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

pub type TestMonitor = Monitor<Arc<FakeAdapter>, Arc<RecordingSink>>;

pub fn monitor(adapter: Arc<FakeAdapter>, sink: Arc<RecordingSink>) -> TestMonitor {
    Monitor::new(config(), adapter, sink)
}

/// A monitor that went through startup, connection and configuration.
pub async fn monitoring(adapter: Arc<FakeAdapter>, sink: Arc<RecordingSink>) -> TestMonitor {
    let mut monitor = monitor(adapter, sink);
    monitor.start().await.unwrap();
    monitor
        .dispatch(Event::DeviceConnected {
            path: target_path(),
        })
        .await;
    assert_eq!(monitor.state(), ConnectionState::Monitoring);
    monitor
}
