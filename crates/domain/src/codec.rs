//! Value codec: pure transforms between raw characteristic payloads and
//! calibrated readings, plus encoding of configuration commands.
//!
//! All multi-byte words are little-endian `u16`.
//!
//! | Quantity | Formula |
//! |----------|---------|
//! | Temperature | `-40 + 165 / 65536 * r` (°C) |
//! | Humidity | `100 / 65536 * (r & !0x3)` (%RH) |
//! | Illuminance | `(r & 0x0FFF) * 0.01 * 2^(r >> 12)` (lx) |

use std::time::Duration;

use crate::error::DecodeError;
use crate::reading::{Reading, Series};

/// Config command enabling data capture.
pub const ENABLE: [u8; 1] = [0x01];

/// Config command disabling data capture.
pub const DISABLE: [u8; 1] = [0x00];

const HUMIDITY_TEMPERATURE_LEN: usize = 4;
const LUXOMETER_LEN: usize = 2;

/// Convert a raw temperature word into degrees Celsius.
#[must_use]
pub fn temperature_from_raw(raw: u16) -> f64 {
    -40.0 + 165.0 / 65536.0 * f64::from(raw)
}

/// Convert a raw humidity word into percent relative humidity.
///
/// The two lowest bits carry status flags and are masked off.
#[must_use]
pub fn humidity_from_raw(raw: u16) -> f64 {
    100.0 / 65536.0 * f64::from(raw & !0x3)
}

/// Convert a raw illuminance word into lux.
#[must_use]
pub fn illuminance_from_raw(raw: u16) -> f64 {
    let mantissa = raw & 0x0FFF;
    let exponent = (raw >> 12) & 0xF;
    f64::from(mantissa) * 0.01 * f64::from(1u16 << exponent)
}

fn read_word(data: &[u8], offset: usize, format: &'static str) -> Result<u16, DecodeError> {
    match data.get(offset..offset + 2) {
        Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
        _ => Err(DecodeError {
            format,
            expected: offset + 2,
            actual: data.len(),
        }),
    }
}

/// Decode a temperature from the first word of `data`.
///
/// # Errors
///
/// Returns [`DecodeError`] when `data` is shorter than 2 bytes.
pub fn decode_temperature(data: &[u8]) -> Result<f64, DecodeError> {
    read_word(data, 0, "temperature").map(temperature_from_raw)
}

/// Decode a humidity from the first word of `data`.
///
/// # Errors
///
/// Returns [`DecodeError`] when `data` is shorter than 2 bytes.
pub fn decode_humidity(data: &[u8]) -> Result<f64, DecodeError> {
    read_word(data, 0, "humidity").map(humidity_from_raw)
}

/// Decode an illuminance from the first word of `data`.
///
/// # Errors
///
/// Returns [`DecodeError`] when `data` is shorter than 2 bytes.
pub fn decode_illuminance(data: &[u8]) -> Result<f64, DecodeError> {
    read_word(data, 0, "illuminance").map(illuminance_from_raw)
}

/// Decode the 4-byte humidity/temperature data characteristic.
///
/// | Bytes | Field |
/// |-------|-------|
/// | 0–1 | temperature word |
/// | 2–3 | humidity word |
///
/// # Errors
///
/// Returns [`DecodeError`] when the payload is shorter than 4 bytes.
pub fn decode_humidity_temperature(data: &[u8]) -> Result<Vec<Reading>, DecodeError> {
    if data.len() < HUMIDITY_TEMPERATURE_LEN {
        return Err(DecodeError {
            format: "humidity/temperature",
            expected: HUMIDITY_TEMPERATURE_LEN,
            actual: data.len(),
        });
    }
    Ok(vec![
        Reading::new(Series::Temperature, decode_temperature(&data[0..2])?),
        Reading::new(Series::Humidity, decode_humidity(&data[2..4])?),
    ])
}

/// Decode the 2-byte luxometer data characteristic.
///
/// # Errors
///
/// Returns [`DecodeError`] when the payload is shorter than 2 bytes.
pub fn decode_luxometer(data: &[u8]) -> Result<Vec<Reading>, DecodeError> {
    if data.len() < LUXOMETER_LEN {
        return Err(DecodeError {
            format: "luxometer",
            expected: LUXOMETER_LEN,
            actual: data.len(),
        });
    }
    Ok(vec![Reading::new(
        Series::Illuminance,
        decode_illuminance(data)?,
    )])
}

/// Encode the sampling period written to a period characteristic.
///
/// The firmware counts in units of 10 ms and holds a single byte, so the
/// value saturates at 255 (2.55 s).
#[must_use]
pub fn encode_period(period: Duration) -> [u8; 1] {
    let units = period.as_millis() / 10;
    [u8::try_from(units).unwrap_or(u8::MAX)]
}
