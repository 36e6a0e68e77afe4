//! Bluetooth device address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A 48-bit Bluetooth device address (e.g. `"B0:B4:48:C9:4A:05"`).
///
/// Parsing accepts either case; display is always upper-case, colon
/// separated, so two spellings of the same address compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    /// Wrap raw address bytes (most significant first).
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Access the raw address bytes.
    #[must_use]
    pub const fn into_inner(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidAddress(s.to_string());

        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(value: DeviceAddress) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_upper_case_address() {
        let addr: DeviceAddress = "B0:B4:48:C9:4A:05".parse().unwrap();
        assert_eq!(addr.into_inner(), [0xB0, 0xB4, 0x48, 0xC9, 0x4A, 0x05]);
    }

    #[test]
    fn should_match_addresses_case_insensitively() {
        let upper: DeviceAddress = "B0:B4:48:C9:4A:05".parse().unwrap();
        let lower: DeviceAddress = "b0:b4:48:c9:4a:05".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(lower.to_string(), "B0:B4:48:C9:4A:05");
    }

    #[test]
    fn should_reject_short_address() {
        assert!("B0:B4:48:C9:4A".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn should_reject_long_address() {
        assert!("B0:B4:48:C9:4A:05:06".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn should_reject_non_hex_octet() {
        let err = "B0:B4:48:C9:4A:ZZ".parse::<DeviceAddress>().unwrap_err();
        assert!(err.to_string().contains("B0:B4:48:C9:4A:ZZ"));
    }

    #[test]
    fn should_reject_single_digit_octets() {
        assert!("B:B4:48:C9:4A:05".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn should_deserialize_from_toml_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            address: DeviceAddress,
        }
        let wrapper: Wrapper = toml::from_str("address = 'b0:b4:48:c9:4a:05'").unwrap();
        assert_eq!(wrapper.address.to_string(), "B0:B4:48:C9:4A:05");
    }
}
