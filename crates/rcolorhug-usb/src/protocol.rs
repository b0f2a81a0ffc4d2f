//! USB identifiers and endpoint layout

use std::fmt;

use rcolorhug_core::DeviceMode;

/// Microchip vendor ID used by the original ColorHug
pub const COLORHUG_VID: u16 = 0x04d8;
/// ColorHug running firmware
pub const COLORHUG_PID_FIRMWARE: u16 = 0xf8da;
/// ColorHug running the bootloader
pub const COLORHUG_PID_BOOTLOADER: u16 = 0xf8db;

/// Hughski vendor ID used by the ColorHug2
pub const COLORHUG2_VID: u16 = 0x273f;
/// ColorHug2 running firmware
pub const COLORHUG2_PID_FIRMWARE: u16 = 0x1004;
/// ColorHug2 running the bootloader
pub const COLORHUG2_PID_BOOTLOADER: u16 = 0x1005;

/// HID interface carrying the command endpoints
pub const INTERFACE: u8 = 0;
/// Interrupt OUT endpoint
pub const EP_OUT: u8 = 0x01;
/// Interrupt IN endpoint
pub const EP_IN: u8 = 0x81;

/// Time between enumeration polls while waiting for a re-enumeration
pub const RECONNECT_POLL_MS: u64 = 100;

/// Hardware generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// Original ColorHug
    ColorHug,
    /// ColorHug2
    ColorHug2,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::ColorHug => write!(f, "ColorHug"),
            Model::ColorHug2 => write!(f, "ColorHug2"),
        }
    }
}

/// Identify a device from its vendor and product IDs
pub fn identify(vid: u16, pid: u16) -> Option<(Model, DeviceMode)> {
    match (vid, pid) {
        (COLORHUG_VID, COLORHUG_PID_FIRMWARE) => Some((Model::ColorHug, DeviceMode::Firmware)),
        (COLORHUG_VID, COLORHUG_PID_BOOTLOADER) => Some((Model::ColorHug, DeviceMode::Bootloader)),
        (COLORHUG2_VID, COLORHUG2_PID_FIRMWARE) => Some((Model::ColorHug2, DeviceMode::Firmware)),
        (COLORHUG2_VID, COLORHUG2_PID_BOOTLOADER) => {
            Some((Model::ColorHug2, DeviceMode::Bootloader))
        }
        _ => None,
    }
}

/// Identity of a device: bus and port path, e.g. `1-2.4`
///
/// The port path survives the re-enumeration that happens when the device
/// switches between bootloader and firmware; the device address does not.
pub fn location_id(bus_id: &str, port_chain: &[u8]) -> String {
    if port_chain.is_empty() {
        return bus_id.to_string();
    }
    let ports: Vec<String> = port_chain.iter().map(|p| p.to_string()).collect();
    format!("{}-{}", bus_id, ports.join("."))
}
