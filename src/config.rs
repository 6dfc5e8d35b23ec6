//! System configuration parameters.
//!
//! Network credentials and the control-server port.  Persisted and loaded
//! by the external storage subsystem; serde + postcard give it the stable
//! byte representation that subsystem stores.

use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_PORT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Station SSID (empty = not provisioned).
    pub wifi_ssid: heapless::String<32>,
    /// WPA2 passphrase (empty = open network).
    pub wifi_password: heapless::String<64>,
    /// TCP port the control server listens on.
    pub listen_port: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
            listen_port: DEFAULT_PORT,
        }
    }
}
