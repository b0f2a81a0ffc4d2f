//! Device selection

use std::sync::Arc;

use rcolorhug_core::types::{CalibrationRecord, CalibrationTypes};
use rcolorhug_core::{Device, DeviceRef, Reconnect};
use rcolorhug_dummy::{DummyBus, DummyDevice};

/// Selector for the emulated device
pub const DUMMY: &str = "dummy";

/// An opened device and the means to find it again after it re-enumerates
pub struct Opened {
    pub device: DeviceRef,
    pub reconnect: Box<dyn Reconnect>,
}

/// Open the device named by `--device`
///
/// `None` picks the first ColorHug on the bus.
pub async fn open(selector: Option<&str>) -> Result<Opened, Box<dyn std::error::Error>> {
    let opened = match selector {
        Some(DUMMY) => open_dummy()?,
        other => open_usb(other).await?,
    };
    log::info!(
        "Using {} ({} mode)",
        opened.device.id(),
        opened.device.mode()
    );
    Ok(opened)
}

/// Emulated ColorHug with a factory calibration in slot 0
fn open_dummy() -> Result<Opened, Box<dyn std::error::Error>> {
    let dummy = Arc::new(DummyDevice::new_default());
    dummy.load_calibration(0, &CalibrationRecord::identity(CalibrationTypes::LCD, "factory"))?;

    let mut bus = DummyBus::new();
    bus.add(dummy.clone());
    Ok(Opened {
        device: dummy,
        reconnect: Box::new(bus),
    })
}

#[cfg(feature = "usb")]
async fn open_usb(selector: Option<&str>) -> Result<Opened, Box<dyn std::error::Error>> {
    use rcolorhug_core::DeviceId;
    use rcolorhug_usb::{UsbDevice, UsbReconnect};

    let device = match selector {
        Some(id) => UsbDevice::open_id(&DeviceId::from(id)).await?,
        None => UsbDevice::open_first().await?,
    };
    Ok(Opened {
        device: Arc::new(device),
        reconnect: Box::new(UsbReconnect),
    })
}

#[cfg(not(feature = "usb"))]
async fn open_usb(_selector: Option<&str>) -> Result<Opened, Box<dyn std::error::Error>> {
    Err("USB support not compiled in (only --device dummy is available)".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcolorhug_core::DeviceMode;

    #[tokio::test]
    async fn test_open_dummy() {
        let opened = open(Some(DUMMY)).await.unwrap();
        assert_eq!(opened.device.id().as_str(), "dummy");
        assert_eq!(opened.device.mode(), DeviceMode::Firmware);
    }
}
