//! The fixed sensor table.
//!
//! Each supported sensor exposes three GATT characteristics on the tag:
//! a *data* register (read), a *config* register (enable/disable) and a
//! *period* register (sampling period). The set of sensors is closed, so
//! it is modelled as an enum indexing a static descriptor table.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::error::DecodeError;
use crate::reading::Reading;

/// Signature of a payload decoder.
pub type DecodeFn = fn(&[u8]) -> Result<Vec<Reading>, DecodeError>;

/// A sensor on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Combined humidity and temperature sensor.
    HumidityTemperature,
    /// Ambient light sensor.
    Luxometer,
}

impl SensorKind {
    /// Number of supported sensors.
    pub const COUNT: usize = 2;

    /// Every supported sensor, in table order.
    pub const ALL: [Self; Self::COUNT] = [Self::HumidityTemperature, Self::Luxometer];

    /// Position of the sensor in [`SENSORS`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::HumidityTemperature => 0,
            Self::Luxometer => 1,
        }
    }

    /// Static descriptor of the sensor.
    #[must_use]
    pub fn descriptor(self) -> &'static SensorDescriptor {
        &SENSORS[self.index()]
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().name)
    }
}

/// The role a characteristic plays for its sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicRole {
    Data,
    Config,
    Period,
}

impl CharacteristicRole {
    pub const ALL: [Self; 3] = [Self::Data, Self::Config, Self::Period];
}

impl fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Data => "data",
            Self::Config => "config",
            Self::Period => "period",
        })
    }
}

/// Static description of one sensor.
#[derive(Debug)]
pub struct SensorDescriptor {
    pub kind: SensorKind,
    /// Human readable name used in logs.
    pub name: &'static str,
    pub data: Uuid,
    pub config: Uuid,
    pub period: Uuid,
    /// Turns a data payload into readings.
    pub decode: DecodeFn,
}

impl SensorDescriptor {
    /// UUID of the characteristic playing `role`.
    #[must_use]
    pub const fn uuid(&self, role: CharacteristicRole) -> Uuid {
        match role {
            CharacteristicRole::Data => self.data,
            CharacteristicRole::Config => self.config,
            CharacteristicRole::Period => self.period,
        }
    }
}

/// Humidity/temperature data register (4-byte payload).
pub const HUMIDITY_DATA: Uuid = Uuid::from_u128(0xf000_aa21_0451_4000_b000_0000_0000_0000);
/// Humidity/temperature config register.
pub const HUMIDITY_CONFIG: Uuid = Uuid::from_u128(0xf000_aa22_0451_4000_b000_0000_0000_0000);
/// Humidity/temperature period register.
pub const HUMIDITY_PERIOD: Uuid = Uuid::from_u128(0xf000_aa23_0451_4000_b000_0000_0000_0000);

/// Luxometer data register (2-byte payload).
pub const LUXOMETER_DATA: Uuid = Uuid::from_u128(0xf000_aa71_0451_4000_b000_0000_0000_0000);
/// Luxometer config register.
pub const LUXOMETER_CONFIG: Uuid = Uuid::from_u128(0xf000_aa72_0451_4000_b000_0000_0000_0000);
/// Luxometer period register.
pub const LUXOMETER_PERIOD: Uuid = Uuid::from_u128(0xf000_aa73_0451_4000_b000_0000_0000_0000);

/// Descriptor table, indexed by [`SensorKind::index`].
pub static SENSORS: [SensorDescriptor; SensorKind::COUNT] = [
    SensorDescriptor {
        kind: SensorKind::HumidityTemperature,
        name: "humidity/temperature",
        data: HUMIDITY_DATA,
        config: HUMIDITY_CONFIG,
        period: HUMIDITY_PERIOD,
        decode: codec::decode_humidity_temperature,
    },
    SensorDescriptor {
        kind: SensorKind::Luxometer,
        name: "luxometer",
        data: LUXOMETER_DATA,
        config: LUXOMETER_CONFIG,
        period: LUXOMETER_PERIOD,
        decode: codec::decode_luxometer,
    },
];

/// Find which sensor and role a characteristic UUID belongs to.
#[must_use]
pub fn lookup(uuid: Uuid) -> Option<(SensorKind, CharacteristicRole)> {
    SENSORS.iter().find_map(|descriptor| {
        CharacteristicRole::ALL
            .into_iter()
            .find(|role| descriptor.uuid(*role) == uuid)
            .map(|role| (descriptor.kind, role))
    })
}
