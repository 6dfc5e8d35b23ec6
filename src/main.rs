//! KiLight Mono firmware — main entry point.
//!
//! Wires the platform adapters to the control server and drives the
//! cooperative loop:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  WifiLink      TcpServerAdapter   MdnsAdapter   Monotonic│
//! │  (LinkPort)    (ServerSocketPort) (DiscoveryPort) Clock  │
//! │                                                          │
//! │  ─────────────────── port boundary ───────────────────── │
//! │                                                          │
//! │        ControlServer (pool · codec · state machine)      │
//! │                      │ WriteRequestSink                  │
//! │                      ▼                                   │
//! │            LightBridge → STATE_DATA → PWM output         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! On `target_os = "espidf"` this runs against the real radio and lwIP; on
//! any other target the simulation adapters stand in, so the binary doubles
//! as a host-side smoke run.

use anyhow::Result;
use log::info;

use kilight::adapters::device_id::{self, DeviceIdentity};
use kilight::adapters::mdns::MdnsAdapter;
use kilight::adapters::tcp::TcpServerAdapter;
use kilight::adapters::time::MonotonicClock;
use kilight::adapters::wifi::{LinkPort, WifiLink};
use kilight::config::SystemConfig;
use kilight::error::Error;
use kilight::net::ControlServer;
use kilight::net::protocol::{WriteRequest, WriteRequestSink};
use kilight::state::{SharedStateData, StateData};

/// Process-wide device snapshot, initialized once here at setup.
static STATE_DATA: SharedStateData = SharedStateData::new(StateData::INIT);

/// Bridges decoded write commands to the light-output logic.  The light
/// subsystem actuates from the updated `STATE_DATA` snapshot on its own
/// tick; nothing here blocks.
struct LightBridge;

impl WriteRequestSink for LightBridge {
    fn on_write_request(&mut self, request: &WriteRequest) {
        info!(
            "write request: on={} brightness={}",
            request.light.on, request.light.brightness
        );
        STATE_DATA.update(|state| state.light = request.light);
    }
}

/// Apply persisted credentials to the link driver.  An unprovisioned device
/// (empty SSID) skips this and loops in the retry path until provisioning
/// writes credentials and reboots.
fn configure_link(link: &mut WifiLink, config: &SystemConfig) -> Result<(), Error> {
    if !config.wifi_ssid.is_empty() {
        link.set_credentials(config.wifi_ssid.as_str(), config.wifi_password.as_str())?;
    }
    Ok(())
}

fn load_config() -> SystemConfig {
    // The storage subsystem owns persisted configuration; build-time
    // environment credentials cover bring-up and the host simulation.
    let mut config = SystemConfig::default();
    if let Some(ssid) = option_env!("KILIGHT_WIFI_SSID") {
        let _ = config.wifi_ssid.push_str(ssid);
    }
    if let Some(password) = option_env!("KILIGHT_WIFI_PASSWORD") {
        let _ = config.wifi_password.push_str(password);
    }
    if cfg!(not(target_os = "espidf")) && config.wifi_ssid.is_empty() {
        // Let an unprovisioned host run reach the idle state.
        let _ = config.wifi_ssid.push_str("KiLightDevNet");
    }
    config
}

#[cfg(target_os = "espidf")]
fn platform_init() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn platform_init() -> Result<()> {
    Ok(())
}

#[cfg(target_os = "espidf")]
fn make_link() -> Result<WifiLink> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::EspWifi;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs))?;
    Ok(WifiLink::new(wifi))
}

#[cfg(not(target_os = "espidf"))]
fn make_link() -> Result<WifiLink> {
    Ok(WifiLink::new())
}

fn main() -> Result<()> {
    platform_init()?;

    info!("KiLight Mono v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    let identity = DeviceIdentity::from_mac(&device_id::read_mac());
    info!("hardware id {}", identity.id_string);

    let mut link = make_link()?;
    configure_link(&mut link, &config)?;

    let mut tcp = TcpServerAdapter::new();
    let mut mdns = MdnsAdapter::new(config.listen_port);
    let mut bridge = LightBridge;
    let clock = MonotonicClock::new();
    let mut server = ControlServer::new(identity, config.listen_port, &STATE_DATA);

    loop {
        let now = clock.now_ms();
        server.poll_transport(&mut tcp);
        if server.has_work(now) {
            server.work(now, &mut tcp, &mut link, &mut mdns, &mut bridge);
        }
        // Sibling subsystems (one-wire telemetry, light output, storage)
        // take their turns here.
        std::thread::sleep(core::time::Duration::from_millis(1));
    }
}
