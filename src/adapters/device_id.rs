//! Device identity derived from the factory MAC address.
//!
//! The 6-byte eFuse MAC is zero-extended into a 64-bit hardware id, printed
//! as 16 uppercase hex digits.  The id feeds:
//! - the mDNS TXT record (`hwid=<16 hex digits>`)
//! - the advertised hostname (`KiLightMono_<16 hex digits>`)
//! - `SystemInfo.hardware_id` in the greeting reply
//!
//! Deterministic across reboots (the MAC is factory-burned).

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x84, 0x1F, 0xE8, 0x2B, 0x90, 0x5D]
}

/// Zero-extend the MAC into the 64-bit hardware id.
pub fn hardware_id(mac: &MacAddress) -> u64 {
    u64::from_be_bytes([0, 0, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]])
}

/// Identity strings the discovery layer and greeting reply advertise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub hardware_id: u64,
    /// 16 uppercase hex digits.
    pub id_string: heapless::String<32>,
    /// `KiLightMono_<16 hex digits>`.
    pub hostname: heapless::String<32>,
}

impl DeviceIdentity {
    pub fn from_mac(mac: &MacAddress) -> Self {
        let hardware_id = hardware_id(mac);
        let mut id_string = heapless::String::new();
        let mut hostname = heapless::String::new();
        // Both render at most 28 chars into 32-char buffers.
        let _ = write!(id_string, "{hardware_id:016X}");
        let _ = write!(hostname, "KiLightMono_{hardware_id:016X}");
        Self {
            hardware_id,
            id_string,
            hostname,
        }
    }
}
