//! Error types for the USB transport

use std::fmt;

use nusb::transfer::TransferError;

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur when talking to a ColorHug over USB
#[derive(Debug)]
pub enum UsbError {
    /// No matching device
    DeviceNotFound,
    /// Device with the requested identity is not connected
    NoSuchDevice(String),
    /// Enumeration failed
    EnumerationFailed(String),
    /// Failed to open device
    OpenFailed(String),
    /// Failed to claim interface
    ClaimFailed(String),
    /// USB transfer failed
    TransferFailed(String),
    /// Device went away mid-transfer
    Disconnected,
    /// Timeout during transfer
    Timeout,
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::DeviceNotFound => write!(
                f,
                "ColorHug device not found (04d8:f8da/f8db, 273f:1004/1005)"
            ),
            UsbError::NoSuchDevice(id) => write!(f, "No ColorHug at {}", id),
            UsbError::EnumerationFailed(msg) => {
                write!(f, "Failed to enumerate USB devices: {}", msg)
            }
            UsbError::OpenFailed(msg) => write!(f, "Failed to open ColorHug: {}", msg),
            UsbError::ClaimFailed(msg) => write!(f, "Failed to claim interface: {}", msg),
            UsbError::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            UsbError::Disconnected => write!(f, "Device disconnected"),
            UsbError::Timeout => write!(f, "Timeout during USB transfer"),
        }
    }
}

impl std::error::Error for UsbError {}

impl From<nusb::Error> for UsbError {
    fn from(e: nusb::Error) -> Self {
        UsbError::TransferFailed(e.to_string())
    }
}

impl From<TransferError> for UsbError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Disconnected => UsbError::Disconnected,
            other => UsbError::TransferFailed(other.to_string()),
        }
    }
}

impl From<UsbError> for rcolorhug_core::Error {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::Timeout => rcolorhug_core::Error::Timeout,
            UsbError::Disconnected | UsbError::NoSuchDevice(_) => {
                rcolorhug_core::Error::Disconnected
            }
            other => rcolorhug_core::Error::Io(other.to_string()),
        }
    }
}
