//! Error types for rcolorhug-core
//!
//! A single error type covers every way a command can fail: transport
//! problems, protocol violations, errors reported by the device itself and
//! validation failures caught before anything reaches the wire.

use thiserror::Error;

use crate::protocol::DeviceStatus;

/// Core error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // Transport errors
    /// Transfer did not complete within the timeout
    #[error("USB transfer timed out")]
    Timeout,
    /// Transfer failed at the I/O level
    #[error("I/O error: {0}")]
    Io(String),
    /// Device disappeared from the bus
    #[error("device disconnected")]
    Disconnected,

    // Protocol errors
    /// Response echoed a different opcode than the request
    #[error("protocol desync: expected opcode 0x{expected:02x}, got 0x{actual:02x}")]
    ProtocolDesync {
        /// Opcode of the request
        expected: u8,
        /// Opcode echoed by the device
        actual: u8,
    },
    /// Response frame was too short for the expected payload
    #[error("short frame: expected at least {expected} bytes, got {actual}")]
    ShortFrame {
        /// Minimum acceptable frame length
        expected: usize,
        /// Received frame length
        actual: usize,
    },
    /// Response frame was longer than a full frame
    #[error("oversized frame of {0} bytes")]
    OversizedFrame(usize),
    /// Flash read-back checksum disagrees with the returned data
    #[error(
        "checksum mismatch at 0x{addr:04x}: device sent 0x{expected:02x}, data folds to 0x{actual:02x}"
    )]
    ChecksumMismatch {
        /// Flash address of the chunk
        addr: u16,
        /// Checksum supplied by the device
        expected: u8,
        /// Checksum computed over the returned data
        actual: u8,
    },
    /// Flash contents differ from the expected image
    #[error("verify failed at 0x{addr:04x}: expected 0x{expected:02x}, found 0x{actual:02x}")]
    VerifyMismatch {
        /// Address of the first differing byte
        addr: u16,
        /// Byte in the image
        expected: u8,
        /// Byte read back from the device
        actual: u8,
    },

    // Device-reported errors
    /// Device answered with a nonzero status byte
    #[error("device failed command 0x{opcode:02x}: {status}")]
    Device {
        /// Opcode of the failed command
        opcode: u8,
        /// Status reported by the device
        status: DeviceStatus,
    },

    // Validation errors
    /// Value cannot be represented as a packed float
    #[error("value {0} out of packed float range [-32767, 32767]")]
    PackedFloatRange(f64),
    /// Calibration slot index is out of range
    #[error("calibration slot {slot} out of range (max {max})")]
    SlotOutOfRange {
        /// Requested slot
        slot: u16,
        /// Number of slots on the device
        max: u16,
    },
    /// Request payload does not fit in one frame
    #[error("payload of {len} bytes exceeds {max} byte limit")]
    PayloadTooLarge {
        /// Requested payload length
        len: usize,
        /// Maximum payload length
        max: usize,
    },
    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    // Session outcomes
    /// Command was never sent because an earlier command for the same
    /// device failed
    #[error("abandoned after earlier failure")]
    Abandoned,
    /// Command was cancelled before it completed
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error was raised before any I/O was attempted
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::PackedFloatRange(_)
                | Self::SlotOutOfRange { .. }
                | Self::PayloadTooLarge { .. }
                | Self::InvalidParameter(_)
        )
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
