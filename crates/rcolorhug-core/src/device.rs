//! Transport capability
//!
//! The queue never opens USB devices itself. It is handed [`DeviceRef`]s,
//! each of which can exchange one frame at a time with one physical device.
//! `rcolorhug-usb` provides the real implementation, `rcolorhug-dummy` an
//! in-memory one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Frame;

/// Stable identity of a physical device
///
/// Used as the busy-tracking key by the queue. For USB devices this is the
/// bus and port path, which stays the same when the device re-enumerates
/// after switching between bootloader and firmware.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which image the device is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceMode {
    /// Bootloader: flash commands available, measurement commands are not
    Bootloader,
    /// Application firmware
    Firmware,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Bootloader => write!(f, "bootloader"),
            DeviceMode::Firmware => write!(f, "firmware"),
        }
    }
}

/// One open device that can exchange frames
///
/// Implementations must tolerate `transfer` being called from one task at a
/// time per device; the queue never issues two concurrent transfers to the
/// same device.
#[async_trait]
pub trait Device: Send + Sync {
    /// Stable identity of this device
    fn id(&self) -> &DeviceId;

    /// Image the device was running when it was opened
    fn mode(&self) -> DeviceMode;

    /// Send one request frame and return the raw response frame
    ///
    /// The response may be a full 64-byte frame or a short one; the codec
    /// validates it. Errors are `Timeout`, `Io` or `Disconnected`.
    async fn transfer(&self, request: &Frame, timeout: Duration) -> Result<Vec<u8>>;
}

/// Shared handle to an open device
pub type DeviceRef = Arc<dyn Device>;

/// Waits for a device to come back after it re-enumerates
///
/// Resetting into the bootloader or booting the new firmware makes the
/// device drop off the bus and reappear, so the old handle is useless.
/// Implementations find the device with the same [`DeviceId`] once it is
/// running `mode` and open it again.
#[async_trait]
pub trait Reconnect: Send + Sync {
    /// Wait up to `timeout` for `id` to reappear in `mode`
    async fn wait_for(&self, id: &DeviceId, mode: DeviceMode, timeout: Duration)
        -> Result<DeviceRef>;
}
