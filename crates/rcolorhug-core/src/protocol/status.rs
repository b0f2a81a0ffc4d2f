//! Status codes returned in byte 0 of every response

use core::fmt;

/// Status reported by the device for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Command succeeded
    None,
    /// Opcode not recognised
    UnknownCmd,
    /// Unlock code for a protected command was wrong
    WrongUnlockCode,
    /// Command recognised but not implemented
    NotImplemented,
    /// Sensor underflow during a reading
    UnderflowSensor,
    /// No serial number has been programmed
    NoSerial,
    /// Watchdog reset during the command
    Watchdog,
    /// Address outside the permitted range
    InvalidAddress,
    /// Length outside the permitted range
    InvalidLength,
    /// Payload checksum did not match
    InvalidChecksum,
    /// Parameter value rejected
    InvalidValue,
    /// Opcode is not available while running the bootloader
    UnknownCmdForBootloader,
    /// Calibration slot is empty
    NoCalibration,
    /// Arithmetic overflow in a multiplication
    OverflowMultiply,
    /// Arithmetic overflow in an addition
    OverflowAddition,
    /// Sensor overflow during a reading
    OverflowSensor,
    /// Firmware stack overflow
    OverflowStack,
    /// Dark offsets have not been set
    NoDarkOffset,
    /// Self test reported a hardware fault
    SelfTestFailed,
    /// Status code this library does not know about
    Unknown(u8),
}

impl DeviceStatus {
    /// Create a DeviceStatus from the raw status byte
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::None,
            0x01 => Self::UnknownCmd,
            0x02 => Self::WrongUnlockCode,
            0x03 => Self::NotImplemented,
            0x04 => Self::UnderflowSensor,
            0x05 => Self::NoSerial,
            0x06 => Self::Watchdog,
            0x07 => Self::InvalidAddress,
            0x08 => Self::InvalidLength,
            0x09 => Self::InvalidChecksum,
            0x0a => Self::InvalidValue,
            0x0b => Self::UnknownCmdForBootloader,
            0x0c => Self::NoCalibration,
            0x0d => Self::OverflowMultiply,
            0x0e => Self::OverflowAddition,
            0x0f => Self::OverflowSensor,
            0x10 => Self::OverflowStack,
            0x11 => Self::NoDarkOffset,
            0x12 => Self::SelfTestFailed,
            other => Self::Unknown(other),
        }
    }

    /// Raw status byte
    pub fn code(&self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::UnknownCmd => 0x01,
            Self::WrongUnlockCode => 0x02,
            Self::NotImplemented => 0x03,
            Self::UnderflowSensor => 0x04,
            Self::NoSerial => 0x05,
            Self::Watchdog => 0x06,
            Self::InvalidAddress => 0x07,
            Self::InvalidLength => 0x08,
            Self::InvalidChecksum => 0x09,
            Self::InvalidValue => 0x0a,
            Self::UnknownCmdForBootloader => 0x0b,
            Self::NoCalibration => 0x0c,
            Self::OverflowMultiply => 0x0d,
            Self::OverflowAddition => 0x0e,
            Self::OverflowSensor => 0x0f,
            Self::OverflowStack => 0x10,
            Self::NoDarkOffset => 0x11,
            Self::SelfTestFailed => 0x12,
            Self::Unknown(code) => *code,
        }
    }

    /// Check if this status indicates success
    pub fn is_success(&self) -> bool {
        *self == Self::None
    }

    fn description(&self) -> &'static str {
        match self {
            Self::None => "success",
            Self::UnknownCmd => "unknown command",
            Self::WrongUnlockCode => "wrong unlock code",
            Self::NotImplemented => "not implemented",
            Self::UnderflowSensor => "sensor underflow",
            Self::NoSerial => "no serial number",
            Self::Watchdog => "watchdog reset",
            Self::InvalidAddress => "invalid address",
            Self::InvalidLength => "invalid length",
            Self::InvalidChecksum => "invalid checksum",
            Self::InvalidValue => "invalid value",
            Self::UnknownCmdForBootloader => "command not supported in bootloader",
            Self::NoCalibration => "no calibration in slot",
            Self::OverflowMultiply => "multiply overflow",
            Self::OverflowAddition => "addition overflow",
            Self::OverflowSensor => "sensor overflow",
            Self::OverflowStack => "stack overflow",
            Self::NoDarkOffset => "no dark offsets",
            Self::SelfTestFailed => "self test failed",
            Self::Unknown(_) => "unknown status",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status 0x{:02x}: {}", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_roundtrip() {
        for code in 0..=0x20u8 {
            assert_eq!(DeviceStatus::from_u8(code).code(), code);
        }
        assert_eq!(DeviceStatus::from_u8(0xfe), DeviceStatus::Unknown(0xfe));
    }

    #[test]
    fn test_display_keeps_numeric_code() {
        let text = DeviceStatus::from_u8(0x0b).to_string();
        assert!(text.contains("0x0b"));
        assert!(text.contains("bootloader"));
    }
}
