//! Object paths for btleplug entities.
//!
//! btleplug identifies peripherals by opaque platform ids; the core works
//! with hierarchical paths. Devices are named after their hardware address
//! under their adapter, characteristics under their device and service:
//!
//! ```text
//! /org/bluez/hci0
//! /org/bluez/hci0/dev_B0_B4_48_C9_4A_05
//! /org/bluez/hci0/dev_B0_B4_48_C9_4A_05/service_f000aa20…/char_f000aa21…
//! ```

use btleplug::api::BDAddr;
use uuid::Uuid;

use sensortag_app::ports::{AdapterId, ObjectPath};
use sensortag_domain::address::DeviceAddress;

const ROOT: &str = "/org/bluez";

/// Adapter id from btleplug's adapter description (e.g. `hci0 (usb:…)`),
/// falling back to `hci{index}` when the description is empty.
#[must_use]
pub fn adapter_id(info: &str, index: usize) -> AdapterId {
    info.split_whitespace()
        .next()
        .map_or_else(|| AdapterId::new(format!("hci{index}")), AdapterId::new)
}

#[must_use]
pub fn adapter_path(adapter: &AdapterId) -> ObjectPath {
    ObjectPath::new(ROOT).child(adapter.as_str())
}

#[must_use]
pub fn device_address(address: BDAddr) -> DeviceAddress {
    DeviceAddress::new(address.into_inner())
}

#[must_use]
pub fn device_path(adapter: &ObjectPath, address: BDAddr) -> ObjectPath {
    let octets = address.into_inner().map(|octet| format!("{octet:02X}"));
    adapter.child(&format!("dev_{}", octets.join("_")))
}

#[must_use]
pub fn service_path(device: &ObjectPath, service: Uuid) -> ObjectPath {
    device.child(&format!("service_{}", service.simple()))
}

#[must_use]
pub fn characteristic_path(service: &ObjectPath, characteristic: Uuid) -> ObjectPath {
    service.child(&format!("char_{}", characteristic.simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensortag_domain::sensor::HUMIDITY_DATA;

    fn tag() -> BDAddr {
        BDAddr::from([0xB0, 0xB4, 0x48, 0xC9, 0x4A, 0x05])
    }

    #[test]
    fn should_take_first_word_of_adapter_info() {
        assert_eq!(adapter_id("hci0 (usb:v1D6Bp0246d0540)", 3).as_str(), "hci0");
    }

    #[test]
    fn should_fall_back_to_index_for_empty_adapter_info() {
        assert_eq!(adapter_id("  ", 1).as_str(), "hci1");
    }

    #[test]
    fn should_name_device_after_address() {
        let adapter = adapter_path(&AdapterId::new("hci0"));
        assert_eq!(
            device_path(&adapter, tag()).as_str(),
            "/org/bluez/hci0/dev_B0_B4_48_C9_4A_05"
        );
    }

    #[test]
    fn should_nest_characteristic_under_device() {
        let device = device_path(&adapter_path(&AdapterId::new("hci0")), tag());
        let service = service_path(&device, Uuid::from_u128(0xf000_aa20_0451_4000_b000_0000_0000_0000));
        let characteristic = characteristic_path(&service, HUMIDITY_DATA);

        assert!(service.is_descendant_of(&device));
        assert!(characteristic.is_descendant_of(&service));
        assert!(characteristic.as_str().ends_with("/char_f000aa2104514000b000000000000000"));
    }

    #[test]
    fn should_keep_address_octets() {
        assert_eq!(device_address(tag()).to_string(), "B0:B4:48:C9:4A:05");
    }
}
