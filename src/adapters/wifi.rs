//! WiFi station-link adapter.
//!
//! Implements [`LinkPort`] — the seam between the connection state machine
//! and the wireless association, which lives independently of any TCP
//! session.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF station driver via
//!   `esp_idf_svc::wifi::EspWifi`.
//! - **all other targets**: deterministic simulation for host-side runs —
//!   joins conclude after two status polls and every fifth attempt fails so
//!   the retry path gets exercised.
//!
//! Join initiation is non-blocking: `begin_join` only kicks the driver off,
//! and the caller observes the outcome through `status` polls.  The driver
//! owns the association timeout; after [`JOIN_POLL_LIMIT`] fruitless polls
//! the adapter reports `Failed` and the state machine takes its retry path.

use core::fmt;

use log::{info, warn};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    JoinFailed,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::JoinFailed => write!(f, "WiFi join could not be initiated"),
        }
    }
}

impl core::error::Error for LinkError {}

/// Association state as seen through status polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No association and none in progress.
    Down,
    /// A join was initiated and has not concluded.
    Joining,
    /// Associated with the access point.
    Up,
    /// The last join attempt concluded unsuccessfully.
    Failed,
}

/// Wireless link primitives consumed by the connection state machine.
pub trait LinkPort {
    /// Whether the radio driver finished its own bring-up.
    fn driver_ready(&self) -> bool;

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), LinkError>;

    /// Initiate a join attempt without blocking.
    fn begin_join(&mut self) -> Result<(), LinkError>;

    /// Poll the association state.
    fn status(&mut self) -> LinkStatus;

    fn rssi(&self) -> Option<i8>;
}

/// Status polls in `Joining` before the attempt is reported `Failed`.
const JOIN_POLL_LIMIT: u32 = 10_000;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), LinkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), LinkError> {
    if password.is_empty() {
        return Ok(()); // open network
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(LinkError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiLink {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    status: LinkStatus,
    joining_polls: u32,
    #[cfg(target_os = "espidf")]
    driver: esp_idf_svc::wifi::EspWifi<'static>,
    #[cfg(not(target_os = "espidf"))]
    sim_join_counter: u32,
}

#[cfg(target_os = "espidf")]
impl WifiLink {
    /// Wrap an already-initialised station driver.
    pub fn new(driver: esp_idf_svc::wifi::EspWifi<'static>) -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            status: LinkStatus::Down,
            joining_polls: 0,
            driver,
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            status: LinkStatus::Down,
            joining_polls: 0,
            sim_join_counter: 0,
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiLink {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiLink {
    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_begin_join(&mut self) -> Result<(), LinkError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            auth_method,
            ..Default::default()
        };
        self.driver
            .set_configuration(&Configuration::Client(client))
            .map_err(|_| LinkError::JoinFailed)?;
        self.driver.start().map_err(|_| LinkError::JoinFailed)?;
        self.driver.connect().map_err(|_| LinkError::JoinFailed)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_begin_join(&mut self) -> Result<(), LinkError> {
        self.sim_join_counter = self.sim_join_counter.wrapping_add(1);
        info!(
            "wifi(sim): joining '{}' (attempt {})",
            self.ssid, self.sim_join_counter
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_associated(&self) -> bool {
        self.driver.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_associated(&self) -> bool {
        self.joining_polls >= 2 && self.sim_join_counter % 5 != 0
    }

    #[cfg(target_os = "espidf")]
    fn platform_join_rejected(&self) -> bool {
        false // the driver reports failure through the poll limit
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_join_rejected(&self) -> bool {
        self.joining_polls >= 2 && self.sim_join_counter % 5 == 0
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: ap_info is a valid out-pointer and the call only reads
        // driver state.
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        if rc == esp_idf_svc::sys::ESP_OK {
            Some(ap_info.rssi as i8)
        } else {
            None
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        // Oscillate between roughly -66 and -55 dBm for realism.
        let swing = ((self.sim_join_counter % 12) as i8) - 6;
        Some(-60_i8.saturating_add(swing))
    }
}

// ───────────────────────────────────────────────────────────────
// LinkPort
// ───────────────────────────────────────────────────────────────

impl LinkPort for WifiLink {
    fn driver_ready(&self) -> bool {
        // Constructing the adapter implies the radio driver came up.
        true
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| LinkError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|_| LinkError::InvalidPassword)?;
        info!("wifi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn begin_join(&mut self) -> Result<(), LinkError> {
        if self.ssid.is_empty() {
            return Err(LinkError::NoCredentials);
        }
        self.platform_begin_join()?;
        self.joining_polls = 0;
        self.status = LinkStatus::Joining;
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        match self.status {
            LinkStatus::Joining => {
                self.joining_polls = self.joining_polls.saturating_add(1);
                if self.platform_associated() {
                    info!("wifi: associated (rssi {:?})", self.platform_rssi());
                    self.status = LinkStatus::Up;
                } else if self.platform_join_rejected() || self.joining_polls > JOIN_POLL_LIMIT {
                    warn!("wifi: join attempt failed");
                    self.status = LinkStatus::Failed;
                }
            }
            LinkStatus::Up => {
                if !self.platform_associated() {
                    warn!("wifi: association lost");
                    self.status = LinkStatus::Down;
                }
            }
            LinkStatus::Down | LinkStatus::Failed => {}
        }
        self.status
    }

    fn rssi(&self) -> Option<i8> {
        if self.status == LinkStatus::Up {
            self.platform_rssi()
        } else {
            None
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests (simulation path)
// ───────────────────────────────────────────────────────────────
