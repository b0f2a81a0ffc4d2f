//! Queued commands and what happens to their responses

use std::fmt;

use rcolorhug_core::error::{Error, Result};
use rcolorhug_core::protocol::packed::{
    get_fixed_str, get_packed, get_u16, get_u32, PACKED_FLOAT_LEN,
};
use rcolorhug_core::protocol::{decode_read_flash, decode_response};
use rcolorhug_core::types::{CalibrationMap, CalibrationRecord, FirmwareVersion, Leds, Triple};
use rcolorhug_core::DeviceRef;

/// Where the response payload of a command goes
pub enum OutputTarget<'a> {
    /// Command has no response payload
    None,
    /// Payload is copied verbatim into a caller-owned buffer
    ///
    /// The buffer length is the expected payload length.
    Borrowed(&'a mut [u8]),
    /// Payload lands in a queue-owned scratch buffer that is handed to a
    /// transform
    Owned {
        /// Expected payload length
        scratch_len: usize,
        /// Decoder that consumes the scratch buffer
        transform: Transform<'a>,
    },
}

impl OutputTarget<'_> {
    /// Number of payload bytes the response must carry
    pub fn expected_len(&self) -> usize {
        match self {
            OutputTarget::None => 0,
            OutputTarget::Borrowed(buf) => buf.len(),
            OutputTarget::Owned { scratch_len, .. } => *scratch_len,
        }
    }
}

impl fmt::Debug for OutputTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::None => write!(f, "None"),
            OutputTarget::Borrowed(buf) => write!(f, "Borrowed({} bytes)", buf.len()),
            OutputTarget::Owned {
                scratch_len,
                transform,
            } => write!(f, "Owned({} bytes, {})", scratch_len, transform.kind()),
        }
    }
}

/// Decoder applied to a response payload
///
/// Each variant holds the destination it writes to. The scratch buffer is
/// moved into [`Transform::apply`] and dropped there.
pub enum Transform<'a> {
    /// Single byte
    U8(&'a mut u8),
    /// Little-endian u16
    U16(&'a mut u16),
    /// Little-endian u32
    U32(&'a mut u32),
    /// One packed float
    PackedFloat(&'a mut f64),
    /// Three packed floats
    Triple(&'a mut Triple),
    /// Calibration slot contents
    Calibration(&'a mut CalibrationRecord),
    /// Firmware version triple
    FirmwareVersion(&'a mut FirmwareVersion),
    /// LED state
    Leds(&'a mut Leds),
    /// Calibration map
    CalibrationMap(&'a mut CalibrationMap),
    /// NUL-padded string
    String(&'a mut String),
    /// Flash read-back: check the checksum, then copy the data to `dest`
    ReadFlash {
        /// Address of the chunk
        addr: u16,
        /// Where the data goes
        dest: &'a mut [u8],
    },
    /// Flash verify: check the checksum, then compare against `expected`
    VerifyFlash {
        /// Address of the chunk
        addr: u16,
        /// Bytes that should be in flash
        expected: Vec<u8>,
    },
    /// Anything else
    Custom(Box<dyn FnOnce(Vec<u8>) -> Result<()> + Send + 'a>),
}

impl<'a> Transform<'a> {
    /// Wrap a closure
    pub fn custom<F>(f: F) -> Self
    where
        F: FnOnce(Vec<u8>) -> Result<()> + Send + 'a,
    {
        Transform::Custom(Box::new(f))
    }

    fn kind(&self) -> &'static str {
        match self {
            Transform::U8(_) => "u8",
            Transform::U16(_) => "u16",
            Transform::U32(_) => "u32",
            Transform::PackedFloat(_) => "packed-float",
            Transform::Triple(_) => "triple",
            Transform::Calibration(_) => "calibration",
            Transform::FirmwareVersion(_) => "firmware-version",
            Transform::Leds(_) => "leds",
            Transform::CalibrationMap(_) => "calibration-map",
            Transform::String(_) => "string",
            Transform::ReadFlash { .. } => "read-flash",
            Transform::VerifyFlash { .. } => "verify-flash",
            Transform::Custom(_) => "custom",
        }
    }

    /// Smallest scratch buffer this transform can decode
    fn min_len(&self) -> usize {
        match self {
            Transform::U8(_) | Transform::Leds(_) => 1,
            Transform::U16(_) => 2,
            Transform::U32(_) => 4,
            Transform::PackedFloat(_) => PACKED_FLOAT_LEN,
            Transform::Triple(_) => Triple::WIRE_LEN,
            Transform::Calibration(_) => CalibrationRecord::WIRE_LEN,
            Transform::FirmwareVersion(_) => FirmwareVersion::WIRE_LEN,
            Transform::CalibrationMap(_) => CalibrationMap::WIRE_LEN,
            Transform::ReadFlash { dest, .. } => 1 + dest.len(),
            Transform::VerifyFlash { expected, .. } => 1 + expected.len(),
            Transform::String(_) | Transform::Custom(_) => 0,
        }
    }

    /// Decode `scratch` into the destination
    ///
    /// `scratch` is exactly as long as the `scratch_len` the transform was
    /// queued with. A buffer too small for the transform fails with
    /// `ShortFrame`.
    pub fn apply(self, scratch: Vec<u8>) -> Result<()> {
        let expected = self.min_len();
        if scratch.len() < expected {
            return Err(Error::ShortFrame {
                expected,
                actual: scratch.len(),
            });
        }
        match self {
            Transform::U8(out) => *out = scratch[0],
            Transform::U16(out) => *out = get_u16(&scratch, 0),
            Transform::U32(out) => *out = get_u32(&scratch, 0),
            Transform::PackedFloat(out) => *out = get_packed(&scratch, 0),
            Transform::Triple(out) => *out = Triple::from_bytes(&scratch),
            Transform::Calibration(out) => *out = CalibrationRecord::from_bytes(&scratch),
            Transform::FirmwareVersion(out) => *out = FirmwareVersion::from_bytes(&scratch),
            Transform::Leds(out) => *out = Leds::from_bits_truncate(scratch[0]),
            Transform::CalibrationMap(out) => *out = CalibrationMap::from_bytes(&scratch),
            Transform::String(out) => *out = get_fixed_str(&scratch),
            Transform::ReadFlash { addr, dest } => {
                let data = decode_read_flash(addr, &scratch)?;
                let len = dest.len();
                dest.copy_from_slice(&data[..len]);
            }
            Transform::VerifyFlash { addr, expected } => {
                let data = decode_read_flash(addr, &scratch)?;
                if let Some(i) = data.iter().zip(&expected).position(|(a, b)| a != b) {
                    return Err(Error::VerifyMismatch {
                        addr: addr.wrapping_add(i as u16),
                        expected: expected[i],
                        actual: data[i],
                    });
                }
            }
            Transform::Custom(f) => return f(scratch),
        }
        Ok(())
    }
}

/// Lifecycle of a command; terminal states never change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandState {
    Pending,
    InFlight,
    Complete(Completion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Ok,
    Failed,
    Abandoned,
}

/// One queued command
pub(crate) struct Command<'a> {
    pub device: DeviceRef,
    pub opcode: u8,
    pub input: Vec<u8>,
    pub output: OutputTarget<'a>,
    pub state: CommandState,
}

impl<'a> Command<'a> {
    pub fn new(device: DeviceRef, opcode: u8, input: Vec<u8>, output: OutputTarget<'a>) -> Self {
        Self {
            device,
            opcode,
            input,
            output,
            state: CommandState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == CommandState::Pending
    }

    /// Validate the response frame and deliver its payload
    ///
    /// The output target is consumed whether or not this succeeds.
    pub fn finish(&mut self, response: &[u8]) -> Result<()> {
        let payload = decode_response(response, self.opcode, self.output.expected_len())?;
        match std::mem::replace(&mut self.output, OutputTarget::None) {
            OutputTarget::None => Ok(()),
            OutputTarget::Borrowed(buf) => {
                buf.copy_from_slice(payload);
                Ok(())
            }
            OutputTarget::Owned { transform, .. } => transform.apply(payload.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcolorhug_core::protocol::checksum;

    fn read_back(data: &[u8]) -> Vec<u8> {
        let mut payload = vec![checksum(data)];
        payload.extend_from_slice(data);
        payload
    }

    #[test]
    fn test_scalar_transforms() {
        let mut value = 0u16;
        Transform::U16(&mut value).apply(vec![0x34, 0x12]).unwrap();
        assert_eq!(value, 0x1234);

        let mut value = 0u32;
        Transform::U32(&mut value)
            .apply(vec![0xef, 0xbe, 0xad, 0xde])
            .unwrap();
        assert_eq!(value, 0xdeadbeef);

        let mut value = 0.0;
        Transform::PackedFloat(&mut value)
            .apply(65535i32.to_le_bytes().to_vec())
            .unwrap();
        assert_eq!(value, 1.0);

        let mut leds = Leds::empty();
        Transform::Leds(&mut leds).apply(vec![0x02]).unwrap();
        assert_eq!(leds, Leds::RED);
    }

    #[test]
    fn test_string_transform() {
        let mut name = String::new();
        let mut scratch = b"Richard".to_vec();
        scratch.resize(60, 0);
        Transform::String(&mut name).apply(scratch).unwrap();
        assert_eq!(name, "Richard");
    }

    #[test]
    fn test_read_flash_transform() {
        let mut dest = [0u8; 3];
        Transform::ReadFlash {
            addr: 0x4000,
            dest: &mut dest,
        }
        .apply(read_back(&[7, 8, 9]))
        .unwrap();
        assert_eq!(dest, [7, 8, 9]);

        let mut bad = read_back(&[7, 8, 9]);
        bad[0] ^= 1;
        let result = Transform::ReadFlash {
            addr: 0x4000,
            dest: &mut dest,
        }
        .apply(bad);
        assert!(matches!(result, Err(Error::ChecksumMismatch { addr: 0x4000, .. })));
    }

    #[test]
    fn test_verify_flash_reports_first_difference() {
        let result = Transform::VerifyFlash {
            addr: 0x4010,
            expected: vec![1, 2, 3, 4],
        }
        .apply(read_back(&[1, 2, 0xff, 4]));
        assert_eq!(
            result,
            Err(Error::VerifyMismatch {
                addr: 0x4012,
                expected: 3,
                actual: 0xff
            })
        );
    }

    #[test]
    fn test_custom_transform() {
        let mut seen = Vec::new();
        Transform::custom(|scratch| {
            seen = scratch;
            Ok(())
        })
        .apply(vec![1, 2])
        .unwrap();
        assert_eq!(seen, [1, 2]);

        let result = Transform::custom(|_| Err(Error::InvalidParameter("nope".into())))
            .apply(vec![0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_short_scratch_fails_without_panicking() {
        let mut serial = 0u32;
        assert_eq!(
            Transform::U32(&mut serial).apply(vec![1, 2]),
            Err(Error::ShortFrame {
                expected: 4,
                actual: 2
            })
        );

        let mut version = FirmwareVersion::default();
        assert!(Transform::FirmwareVersion(&mut version).apply(vec![]).is_err());

        let mut dest = [0u8; 8];
        let result = Transform::ReadFlash {
            addr: 0x4000,
            dest: &mut dest,
        }
        .apply(read_back(&[1, 2, 3]));
        assert_eq!(
            result,
            Err(Error::ShortFrame {
                expected: 9,
                actual: 4
            })
        );

        let result = Transform::VerifyFlash {
            addr: 0x4000,
            expected: vec![1, 2, 3, 4],
        }
        .apply(read_back(&[1, 2]));
        assert!(matches!(result, Err(Error::ShortFrame { .. })));
    }

    #[test]
    fn test_output_expected_len() {
        let mut buf = [0u8; 6];
        assert_eq!(OutputTarget::None.expected_len(), 0);
        assert_eq!(OutputTarget::Borrowed(&mut buf).expected_len(), 6);
        let mut value = 0u8;
        let owned = OutputTarget::Owned {
            scratch_len: 1,
            transform: Transform::U8(&mut value),
        };
        assert_eq!(owned.expected_len(), 1);
        assert_eq!(format!("{:?}", owned), "Owned(1 bytes, u8)");
    }
}
