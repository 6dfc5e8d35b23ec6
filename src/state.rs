//! Device state snapshot shared between the light logic, telemetry
//! producers, and the network protocol layer.
//!
//! [`StateData`] is the last-known output/telemetry picture of the device:
//! what the LED channel is doing, how fast the fan spins, and the two
//! monitored temperatures.  It lives for the whole process in a
//! [`SharedStateData`] cell and is only ever touched inside the platform
//! critical section — the same mutual-exclusion scope the transport stack
//! uses — so the protocol layer can never encode a torn snapshot while the
//! light subsystem or the one-wire telemetry task is mid-update.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};

/// RGB + tunable-white output colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub cold_white: u8,
    pub warm_white: u8,
}

/// Commanded output of the single LED channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    /// 0–255 overall brightness applied on top of the colour.
    pub brightness: u8,
    pub color: Color,
}

/// Process-wide device snapshot.  Temperatures are centi-degrees Celsius as
/// delivered by the one-wire sensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateData {
    pub light: LightState,
    pub fan_rpm: u16,
    pub driver_temp_centi_c: i16,
    pub supply_temp_centi_c: i16,
}

impl StateData {
    /// Everything off / zeroed — the power-on picture before the first
    /// telemetry pass.
    pub const INIT: StateData = StateData {
        light: LightState {
            on: false,
            brightness: 0,
            color: Color {
                red: 0,
                green: 0,
                blue: 0,
                cold_white: 0,
                warm_white: 0,
            },
        },
        fan_rpm: 0,
        driver_temp_centi_c: 0,
        supply_temp_centi_c: 0,
    };
}

/// Critical-section-guarded cell holding the process-wide [`StateData`].
///
/// `update` is the scoped mutable entry point for the rest of the firmware;
/// `snapshot` is the read path the protocol layer uses when building a state
/// reply.  Both take the platform critical section for their whole duration.
pub struct SharedStateData {
    cell: Mutex<CriticalSectionRawMutex, RefCell<StateData>>,
}

impl SharedStateData {
    pub const fn new(initial: StateData) -> Self {
        Self {
            cell: Mutex::new(RefCell::new(initial)),
        }
    }

    /// Copy the current snapshot out.
    pub fn snapshot(&self) -> StateData {
        self.cell.lock(|cell| *cell.borrow())
    }

    /// Run `update` against the live state inside the critical section.
    /// `update` must not block.
    pub fn update(&self, update: impl FnOnce(&mut StateData)) {
        self.cell.lock(|cell| update(&mut cell.borrow_mut()));
    }
}
