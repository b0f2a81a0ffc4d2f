//! rcolorhug-usb - USB transport for ColorHug colorimeters
//!
//! Opens ColorHug and ColorHug2 devices with `nusb` and exchanges 64-byte
//! frames over the HID interrupt endpoints.
//!
//! # Supported Hardware
//!
//! - ColorHug (firmware `04d8:f8da`, bootloader `04d8:f8db`)
//! - ColorHug2 (firmware `273f:1004`, bootloader `273f:1005`)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rcolorhug_core::DeviceRef;
//! use rcolorhug_usb::{list_devices, UsbDevice};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! for info in list_devices().await? {
//!     println!("{}", info);
//! }
//! let device: DeviceRef = Arc::new(UsbDevice::open_first().await?);
//! # Ok(())
//! # }
//! ```

mod device;
mod error;
mod protocol;

pub use device::{list_devices, UsbDevice, UsbDeviceInfo, UsbReconnect};
pub use error::{Result, UsbError};
pub use protocol::Model;
