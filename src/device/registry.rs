//! VID/PID to driver lookup.

use super::dummy::DummyDriver;
use super::stubs::{StubDriver, ALI_SPEC, LIANYUN_SPEC, LIANYUN_V2_SPEC, XSAIL_SPEC};
use super::trofeo::TrofeoVisionDriver;
use super::DisplayDriver;

/// One registry row.
pub struct RegistryEntry {
    pub vendor_id: u16,
    pub product_id: u16,
    pub build: fn() -> Box<dyn DisplayDriver>,
}

/// Every known panel, verified and unverified alike.
pub static DEVICE_REGISTRY: &[RegistryEntry] = &[
    RegistryEntry {
        // Thermalright Trofeo Vision (1280x480)
        vendor_id: 0x0416,
        product_id: 0x5302,
        build: || Box::new(TrofeoVisionDriver::new()),
    },
    RegistryEntry {
        // ALi chipset LCD (unverified)
        vendor_id: 0x0416,
        product_id: 0x5406,
        build: || Box::new(StubDriver::new(&ALI_SPEC)),
    },
    RegistryEntry {
        // LianYun LY chipset LCD (unverified)
        vendor_id: 0x0416,
        product_id: 0x5408,
        build: || Box::new(StubDriver::new(&LIANYUN_SPEC)),
    },
    RegistryEntry {
        // LianYun V2 LY1 chipset LCD (unverified)
        vendor_id: 0x0416,
        product_id: 0x5409,
        build: || Box::new(StubDriver::new(&LIANYUN_V2_SPEC)),
    },
    RegistryEntry {
        // Legacy Xsail-based LCD (unverified)
        vendor_id: 0x87AD,
        product_id: 0x70DB,
        build: || Box::new(StubDriver::new(&XSAIL_SPEC)),
    },
    RegistryEntry {
        // Virtual test device (no USB)
        vendor_id: 0xFFFF,
        product_id: 0x0001,
        build: || Box::new(DummyDriver::new()),
    },
];

/// Instantiate the driver registered for `vid:pid`, if any.
pub fn driver_for(vendor_id: u16, product_id: u16) -> Option<Box<dyn DisplayDriver>> {
    DEVICE_REGISTRY
        .iter()
        .find(|e| e.vendor_id == vendor_id && e.product_id == product_id)
        .map(|e| (e.build)())
}

/// Whether `vid:pid` names a known panel.
pub fn is_known(vendor_id: u16, product_id: u16) -> bool {
    DEVICE_REGISTRY
        .iter()
        .any(|e| e.vendor_id == vendor_id && e.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ProtocolStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_known_devices() {
        let trofeo = driver_for(0x0416, 0x5302).unwrap();
        assert_eq!(trofeo.device_name(), "Trofeo Vision");
        assert_eq!(trofeo.protocol_status(), ProtocolStatus::Verified);
        assert_eq!(trofeo.display_width(), 1280);

        let ali = driver_for(0x0416, 0x5406).unwrap();
        assert_eq!(ali.protocol_status(), ProtocolStatus::Unverified);

        assert!(driver_for(0x1234, 0x5678).is_none());
    }

    #[test]
    fn test_registry_has_no_duplicate_ids() {
        for (i, a) in DEVICE_REGISTRY.iter().enumerate() {
            for b in &DEVICE_REGISTRY[i + 1..] {
                assert!(
                    (a.vendor_id, a.product_id) != (b.vendor_id, b.product_id),
                    "duplicate registry entry {:04x}:{:04x}",
                    a.vendor_id,
                    a.product_id
                );
            }
        }
    }

    #[test]
    fn test_driver_instances_match_registry_ids() {
        for entry in DEVICE_REGISTRY {
            let driver = (entry.build)();
            assert_eq!(driver.vendor_id(), entry.vendor_id);
            assert_eq!(driver.product_id(), entry.product_id);
        }
    }
}
