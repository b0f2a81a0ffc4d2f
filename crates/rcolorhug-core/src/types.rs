//! Typed values exchanged with the device
//!
//! Each type knows its own wire layout, so the queue can turn a response
//! payload into a value (and a value into a request payload) without the
//! caller touching raw bytes.

use bitflags::bitflags;
use core::fmt;

use crate::error::{Error, Result};
use crate::protocol::packed::{
    get_fixed_str, get_packed, get_u16, put_fixed_str, put_packed, put_u16, PACKED_FLOAT_LEN,
};
use crate::protocol::{CALIBRATION_DESCRIPTION_LEN, MAX_CALIBRATION_SLOTS};

/// Sensor color filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ColorSelect {
    /// Red filter
    Red = 0,
    /// No filter
    #[default]
    White = 1,
    /// Blue filter
    Blue = 2,
    /// Green filter
    Green = 3,
}

impl ColorSelect {
    /// Create a ColorSelect from the raw byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Red),
            1 => Ok(Self::White),
            2 => Ok(Self::Blue),
            3 => Ok(Self::Green),
            _ => Err(Error::InvalidParameter(format!(
                "unknown color select {}",
                value
            ))),
        }
    }
}

/// Sensor frequency scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Multiplier {
    /// Sensor powered down
    Disabled = 0,
    /// 2% output frequency
    Scale2 = 1,
    /// 20% output frequency
    Scale20 = 2,
    /// 100% output frequency
    #[default]
    Scale100 = 3,
}

impl Multiplier {
    /// Create a Multiplier from the raw byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Scale2),
            2 => Ok(Self::Scale20),
            3 => Ok(Self::Scale100),
            _ => Err(Error::InvalidParameter(format!(
                "unknown multiplier {}",
                value
            ))),
        }
    }
}

bitflags! {
    /// LEDs on the device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Leds: u8 {
        /// Green LED
        const GREEN = 1 << 0;
        /// Red LED
        const RED   = 1 << 1;
    }
}

/// LED blink pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedPattern {
    /// LEDs to drive
    pub leds: Leds,
    /// Number of blinks, 0 for steady
    pub repeat: u8,
    /// On time in units of 10ms
    pub on_time: u8,
    /// Off time in units of 10ms
    pub off_time: u8,
}

impl LedPattern {
    /// Steady state with no blinking
    pub fn steady(leds: Leds) -> Self {
        Self {
            leds,
            ..Default::default()
        }
    }

    /// Request payload for SET_LEDS
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        if self.repeat > 0 && self.on_time == 0 {
            return Err(Error::InvalidParameter(
                "blinking LEDs need a nonzero on time".into(),
            ));
        }
        Ok(vec![self.leds.bits(), self.repeat, self.on_time, self.off_time])
    }
}

/// Firmware version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Micro version
    pub micro: u16,
}

impl FirmwareVersion {
    /// Encoded size
    pub const WIRE_LEN: usize = 6;

    /// Decode from a response payload
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            major: get_u16(buf, 0),
            minor: get_u16(buf, 2),
            micro: get_u16(buf, 4),
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Three packed-float channels (RGB readings, XYZ readings, dark offsets)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Triple {
    /// First channel (R or X)
    pub a: f64,
    /// Second channel (G or Y)
    pub b: f64,
    /// Third channel (B or Z)
    pub c: f64,
}

impl Triple {
    /// Encoded size
    pub const WIRE_LEN: usize = 3 * PACKED_FLOAT_LEN;

    /// Create a new triple
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Decode from a response payload
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            a: get_packed(buf, 0),
            b: get_packed(buf, 4),
            c: get_packed(buf, 8),
        }
    }

    /// Encode, failing if any channel is out of packed-float range
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        put_packed(&mut buf, self.a)?;
        put_packed(&mut buf, self.b)?;
        put_packed(&mut buf, self.c)?;
        Ok(buf)
    }
}

bitflags! {
    /// Display technologies a calibration matrix is valid for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CalibrationTypes: u8 {
        /// LCD panels
        const LCD       = 1 << 0;
        /// CRT monitors
        const CRT       = 1 << 1;
        /// Projectors
        const PROJECTOR = 1 << 2;
        /// LED backlit panels
        const LED       = 1 << 3;
    }
}

/// One calibration slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalibrationRecord {
    /// 3x3 correction matrix, row major
    pub matrix: [f64; 9],
    /// Display types the matrix applies to
    pub types: CalibrationTypes,
    /// Free text, at most 23 bytes
    pub description: String,
}

impl CalibrationRecord {
    /// Encoded size (matrix, type byte, description)
    pub const WIRE_LEN: usize = 9 * PACKED_FLOAT_LEN + 1 + CALIBRATION_DESCRIPTION_LEN;

    /// Identity matrix for the given display types
    pub fn identity(types: CalibrationTypes, description: &str) -> Self {
        let mut matrix = [0.0; 9];
        matrix[0] = 1.0;
        matrix[4] = 1.0;
        matrix[8] = 1.0;
        Self {
            matrix,
            types,
            description: description.to_string(),
        }
    }

    /// Decode from a GET_CALIBRATION payload
    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut matrix = [0.0; 9];
        for (i, m) in matrix.iter_mut().enumerate() {
            *m = get_packed(buf, i * PACKED_FLOAT_LEN);
        }
        let types_offset = 9 * PACKED_FLOAT_LEN;
        Self {
            matrix,
            types: CalibrationTypes::from_bits_truncate(buf[types_offset]),
            description: get_fixed_str(
                &buf[types_offset + 1..types_offset + 1 + CALIBRATION_DESCRIPTION_LEN],
            ),
        }
    }

    /// Encode for SET_CALIBRATION, validating every field first
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        for &m in &self.matrix {
            put_packed(&mut buf, m)?;
        }
        buf.push(self.types.bits());
        put_fixed_str(&mut buf, &self.description, CALIBRATION_DESCRIPTION_LEN)?;
        Ok(buf)
    }
}

/// Check a calibration slot index
pub fn check_slot(slot: u16) -> Result<()> {
    if slot >= MAX_CALIBRATION_SLOTS {
        return Err(Error::SlotOutOfRange {
            slot,
            max: MAX_CALIBRATION_SLOTS,
        });
    }
    Ok(())
}

/// Calibration slot used for each display type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationMap(pub [u16; 6]);

impl CalibrationMap {
    /// Encoded size
    pub const WIRE_LEN: usize = 12;

    /// Decode from a GET_CALIBRATION_MAP payload
    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut map = [0u16; 6];
        for (i, slot) in map.iter_mut().enumerate() {
            *slot = get_u16(buf, i * 2);
        }
        Self(map)
    }

    /// Encode for SET_CALIBRATION_MAP
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::WIRE_LEN);
        for &slot in &self.0 {
            check_slot(slot)?;
            put_u16(&mut buf, slot);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_record_fits_in_frame() {
        // 2-byte slot index in front
        assert!(2 + CalibrationRecord::WIRE_LEN <= crate::protocol::MAX_REQUEST_PAYLOAD);
        assert!(CalibrationRecord::WIRE_LEN <= crate::protocol::MAX_RESPONSE_PAYLOAD);
    }

    #[test]
    fn test_calibration_record_roundtrip() {
        let mut record = CalibrationRecord::identity(
            CalibrationTypes::LCD | CalibrationTypes::LED,
            "Dell U2410",
        );
        record.matrix[1] = -2.0;
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), CalibrationRecord::WIRE_LEN);
        assert_eq!(CalibrationRecord::from_bytes(&bytes), record);
    }

    #[test]
    fn test_calibration_record_validation() {
        let mut record = CalibrationRecord::identity(CalibrationTypes::CRT, "crt");
        record.matrix[4] = 40000.0;
        assert_eq!(record.to_bytes(), Err(Error::PackedFloatRange(40000.0)));

        let record = CalibrationRecord::identity(
            CalibrationTypes::CRT,
            "a description that is far too long",
        );
        assert!(matches!(
            record.to_bytes(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_check_slot() {
        assert!(check_slot(0).is_ok());
        assert!(check_slot(63).is_ok());
        assert_eq!(
            check_slot(64),
            Err(Error::SlotOutOfRange { slot: 64, max: 64 })
        );
    }

    #[test]
    fn test_led_pattern_payload() {
        let pattern = LedPattern {
            leds: Leds::RED | Leds::GREEN,
            repeat: 3,
            on_time: 10,
            off_time: 20,
        };
        assert_eq!(pattern.to_payload().unwrap(), [0x03, 3, 10, 20]);
        assert!(LedPattern {
            repeat: 1,
            ..Default::default()
        }
        .to_payload()
        .is_err());
    }

    #[test]
    fn test_firmware_version() {
        let v = FirmwareVersion::from_bytes(&[1, 0, 2, 0, 0x10, 0x00]);
        assert_eq!(v.to_string(), "1.2.16");
    }
}
