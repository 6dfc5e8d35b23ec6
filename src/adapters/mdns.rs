//! mDNS discovery adapter.
//!
//! Advertises `_kilight._tcp` with the hostname and a `hwid` TXT record so
//! control clients can find the device without static addressing.  Uses the
//! `esp-idf-svc` mDNS wrappers on device; a logging no-op on simulation
//! targets.
//!
//! Lifecycle follows the link: announced once the server reaches its idle
//! family, withdrawn when the association drops.

use log::info;

const MDNS_SERVICE_TYPE: &str = "_kilight";
const MDNS_SERVICE_PROTO: &str = "_tcp";

/// Discovery announcement seam consumed by the connection state machine.
pub trait DiscoveryPort {
    /// Register the hostname and hardware id.  Returns `false` if the
    /// platform refused the registration (the server continues without it).
    fn announce(&mut self, hostname: &str, hardware_id: &str) -> bool;

    /// Remove the registration.  Idempotent.
    fn withdraw(&mut self);
}

/// mDNS advertisement adapter.
pub struct MdnsAdapter {
    port: u16,
    active: bool,
}

impl MdnsAdapter {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            active: false,
        }
    }

    /// Whether mDNS is currently advertising.
    pub fn is_active(&self) -> bool {
        self.active
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_announce(&self, hostname: &str, hardware_id: &str) -> bool {
        use esp_idf_svc::sys::{
            ESP_OK, mdns_hostname_set, mdns_init, mdns_instance_name_set, mdns_service_add,
            mdns_service_txt_item_set,
        };
        unsafe {
            let ret = mdns_init();
            if ret != ESP_OK as i32 {
                log::error!("mdns: mdns_init failed ({ret})");
                return false;
            }

            let mut hostname_buf = [0u8; 32];
            let hb = hostname.as_bytes();
            let hl = hb.len().min(31);
            hostname_buf[..hl].copy_from_slice(&hb[..hl]);
            mdns_hostname_set(hostname_buf.as_ptr().cast());
            mdns_instance_name_set(c"KiLight Mono".as_ptr().cast());

            let svc_type = c"_kilight";
            let svc_proto = c"_tcp";
            mdns_service_add(
                c"KiLight".as_ptr().cast(),
                svc_type.as_ptr().cast(),
                svc_proto.as_ptr().cast(),
                self.port,
                core::ptr::null_mut(),
                0,
            );

            let ver = concat!(env!("CARGO_PKG_VERSION"), "\0");
            let mut id_buf = [0u8; 24];
            let ib = hardware_id.as_bytes();
            let il = ib.len().min(23);
            id_buf[..il].copy_from_slice(&ib[..il]);

            mdns_service_txt_item_set(
                svc_type.as_ptr().cast(),
                svc_proto.as_ptr().cast(),
                c"version".as_ptr().cast(),
                ver.as_ptr().cast(),
            );
            mdns_service_txt_item_set(
                svc_type.as_ptr().cast(),
                svc_proto.as_ptr().cast(),
                c"hwid".as_ptr().cast(),
                id_buf.as_ptr().cast(),
            );
        }
        true
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_announce(&self, hostname: &str, hardware_id: &str) -> bool {
        info!(
            "mdns(sim): registered {hostname}.local {MDNS_SERVICE_TYPE}.{MDNS_SERVICE_PROTO}:{} v={} hwid={hardware_id}",
            self.port,
            env!("CARGO_PKG_VERSION"),
        );
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_withdraw(&self) {
        unsafe {
            esp_idf_svc::sys::mdns_free();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_withdraw(&self) {
        info!("mdns(sim): unregistered");
    }
}

impl DiscoveryPort for MdnsAdapter {
    fn announce(&mut self, hostname: &str, hardware_id: &str) -> bool {
        if self.active {
            return true;
        }
        if !self.platform_announce(hostname, hardware_id) {
            return false;
        }
        self.active = true;
        info!(
            "mdns: advertising {hostname}.local → {MDNS_SERVICE_TYPE}.{MDNS_SERVICE_PROTO}:{}",
            self.port
        );
        true
    }

    fn withdraw(&mut self) {
        if !self.active {
            return;
        }
        self.platform_withdraw();
        self.active = false;
        info!("mdns: withdrawn");
    }
}
