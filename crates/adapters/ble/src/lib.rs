//! # sensortag-adapter-ble
//!
//! BLE adapter: implements the `AdapterService` port over
//! [btleplug](https://docs.rs/btleplug) and turns central events into core
//! events.
//!
//! ## How it works
//!
//! btleplug hides the platform object tree behind adapters and peripherals.
//! This adapter rebuilds a path-based view of it (see [`paths`]) so the core
//! can match characteristics to their device by path prefix, and keeps a
//! cache from paths back to btleplug handles. The cache is refreshed on every
//! enumeration and lazily when an unknown path is requested. Enumeration
//! resolves the services of connected devices that expose none yet, so a
//! tag connected before startup is usable without a connect event.
//!
//! Every radio call is bounded by the configured operation timeout.
//!
//! ## Limitations
//!
//! btleplug exposes neither adapter power control nor object removal:
//! adapters are reported as powered and `DeviceRemoved` is never emitted.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `sensortag-app` and `sensortag-domain`.

mod config;
mod error;
mod events;
pub mod paths;

pub use config::{BleConfig, ConnectionLatency, ParseLatencyError};
pub use error::BleError;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use btleplug::api::{Central as _, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use sensortag_app::event::Event;
use sensortag_app::ports::{
    AdapterId, AdapterInfo, AdapterService, CharacteristicObject, DeviceObject, ManagedObject,
    ObjectPath,
};
use sensortag_domain::error::SensorTagError;

const EVENT_BUFFER: usize = 64;

struct AdapterEntry {
    id: AdapterId,
    path: ObjectPath,
    central: Adapter,
}

/// [`AdapterService`] backed by the host's BLE stack.
pub struct BleAdapterService {
    config: BleConfig,
    adapters: Vec<AdapterEntry>,
    devices: RwLock<HashMap<ObjectPath, Peripheral>>,
    characteristics: RwLock<HashMap<ObjectPath, (Peripheral, Characteristic)>>,
}

impl BleAdapterService {
    /// Open the platform BLE manager and list its adapters.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when the host has no adapter, or
    /// [`BleError::Transport`] if the manager cannot be opened.
    #[tracing::instrument(skip_all)]
    pub async fn new(config: BleConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let centrals = manager.adapters().await?;
        if centrals.is_empty() {
            return Err(BleError::NotAvailable);
        }

        let mut adapters = Vec::with_capacity(centrals.len());
        for (index, central) in centrals.into_iter().enumerate() {
            let info = central.adapter_info().await.unwrap_or_default();
            let id = paths::adapter_id(&info, index);
            tracing::info!(adapter = %id, %info, "found BLE adapter");
            adapters.push(AdapterEntry {
                path: paths::adapter_path(&id),
                id,
                central,
            });
        }
        tracing::debug!(
            latency = %config.connection_latency,
            timeout_secs = config.operation_timeout_secs,
            "BLE adapter service ready"
        );

        Ok(Self {
            config,
            adapters,
            devices: RwLock::new(HashMap::new()),
            characteristics: RwLock::new(HashMap::new()),
        })
    }

    /// Stream of core events for every adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::Transport`] if an adapter refuses to deliver
    /// events.
    pub async fn events(&self) -> Result<impl Stream<Item = Event> + Unpin + Send + 'static, BleError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        for entry in &self.adapters {
            let events = entry.central.events().await?;
            tokio::spawn(events::forward(
                entry.central.clone(),
                entry.path.clone(),
                events,
                tx.clone(),
                self.config.operation_timeout(),
            ));
        }
        Ok(ReceiverStream::new(rx))
    }

    fn central(&self, id: &AdapterId) -> Result<&Adapter, BleError> {
        self.adapters
            .iter()
            .find(|entry| entry.id == *id)
            .map(|entry| &entry.central)
            .ok_or_else(|| BleError::UnknownObject(id.to_string()))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T, btleplug::Error>>,
    ) -> Result<T, BleError> {
        let timeout: Duration = self.config.operation_timeout();
        tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| BleError::Timeout { operation, timeout })?
            .map_err(BleError::from)
    }

    /// Enumerate adapters, devices and the characteristics of connected
    /// devices, replacing the handle cache.
    async fn refresh(&self) -> Result<Vec<ManagedObject>, BleError> {
        let mut objects = Vec::new();
        let mut devices = HashMap::new();
        let mut characteristics = HashMap::new();

        for entry in &self.adapters {
            objects.push(ManagedObject::Adapter(AdapterInfo {
                id: entry.id.clone(),
                powered: true,
            }));

            for peripheral in self.bounded("list peripherals", entry.central.peripherals()).await? {
                let address = peripheral.address();
                let path = paths::device_path(&entry.path, address);
                let connected = peripheral.is_connected().await.unwrap_or(false);
                objects.push(ManagedObject::Device(DeviceObject {
                    path: path.clone(),
                    address: paths::device_address(address),
                    connected,
                }));

                if connected {
                    if peripheral.characteristics().is_empty()
                        && let Err(err) = self
                            .bounded("discover services", peripheral.discover_services())
                            .await
                    {
                        tracing::warn!(%path, %err, "service discovery failed");
                    }
                    for characteristic in peripheral.characteristics() {
                        let service = paths::service_path(&path, characteristic.service_uuid);
                        let handle = paths::characteristic_path(&service, characteristic.uuid);
                        objects.push(ManagedObject::Characteristic(CharacteristicObject {
                            path: handle.clone(),
                            uuid: characteristic.uuid,
                            service,
                        }));
                        characteristics.insert(handle, (peripheral.clone(), characteristic));
                    }
                }
                devices.insert(path, peripheral);
            }
        }

        tracing::trace!(
            devices = devices.len(),
            characteristics = characteristics.len(),
            "object tree refreshed"
        );
        *self.devices.write().await = devices;
        *self.characteristics.write().await = characteristics;
        Ok(objects)
    }

    async fn device(&self, path: &ObjectPath) -> Result<Peripheral, BleError> {
        if let Some(peripheral) = self.devices.read().await.get(path) {
            return Ok(peripheral.clone());
        }
        self.refresh().await?;
        self.devices
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BleError::UnknownObject(path.to_string()))
    }

    async fn characteristic(
        &self,
        path: &ObjectPath,
    ) -> Result<(Peripheral, Characteristic), BleError> {
        if let Some(entry) = self.characteristics.read().await.get(path) {
            return Ok(entry.clone());
        }
        self.refresh().await?;
        self.characteristics
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BleError::UnknownObject(path.to_string()))
    }
}

impl AdapterService for BleAdapterService {
    async fn list_adapters(&self) -> Result<Vec<AdapterInfo>, SensorTagError> {
        Ok(self
            .adapters
            .iter()
            .map(|entry| AdapterInfo {
                id: entry.id.clone(),
                powered: true,
            })
            .collect())
    }

    async fn set_powered(&self, adapter: &AdapterId, _powered: bool) -> Result<(), SensorTagError> {
        self.central(adapter)?;
        Err(BleError::Unsupported("adapter power control").into())
    }

    async fn start_discovery(&self, adapter: &AdapterId) -> Result<(), SensorTagError> {
        let central = self.central(adapter)?;
        self.bounded("start scan", central.start_scan(ScanFilter::default()))
            .await?;
        tracing::debug!(%adapter, "scan started");
        Ok(())
    }

    async fn stop_discovery(&self, adapter: &AdapterId) -> Result<(), SensorTagError> {
        let central = self.central(adapter)?;
        self.bounded("stop scan", central.stop_scan()).await?;
        tracing::debug!(%adapter, "scan stopped");
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ManagedObject>, SensorTagError> {
        Ok(self.refresh().await?)
    }

    async fn connect(&self, device: &ObjectPath) -> Result<(), SensorTagError> {
        let peripheral = self.device(device).await?;
        self.bounded("connect", peripheral.connect()).await?;
        Ok(())
    }

    async fn disconnect(&self, device: &ObjectPath) -> Result<(), SensorTagError> {
        let peripheral = self.device(device).await?;
        self.bounded("disconnect", peripheral.disconnect()).await?;
        Ok(())
    }

    async fn read_value(&self, characteristic: &ObjectPath) -> Result<Vec<u8>, SensorTagError> {
        let (peripheral, handle) = self.characteristic(characteristic).await?;
        Ok(self.bounded("read", peripheral.read(&handle)).await?)
    }

    async fn write_value(
        &self,
        characteristic: &ObjectPath,
        value: &[u8],
    ) -> Result<(), SensorTagError> {
        let (peripheral, handle) = self.characteristic(characteristic).await?;
        self.bounded(
            "write",
            peripheral.write(&handle, value, WriteType::WithResponse),
        )
        .await?;
        Ok(())
    }
}
