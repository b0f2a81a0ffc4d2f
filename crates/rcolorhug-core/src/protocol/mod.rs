//! ColorHug wire protocol
//!
//! Every exchange with the device is one fixed-size request frame followed
//! by one response frame:
//!
//! ```text
//! request:  [opcode][payload ...................][zero padding]
//! response: [status][opcode][payload ...........][padding]
//! ```
//!
//! Multi-byte integers are little-endian. Fractional values travel as
//! "packed floats", see [`packed`].

mod flash;
mod frame;
pub mod opcodes;
pub mod packed;
mod status;

pub use flash::{
    checksum, decode_read_flash, erase_flash_payload, read_flash_payload, write_flash_payload,
    MAX_READ_CHUNK, MAX_WRITE_CHUNK,
};
pub use frame::{decode_response, encode_request, Frame};
pub use status::DeviceStatus;

// ===========================================================================
// Frame geometry
// ===========================================================================

/// Size of one frame in either direction (full-speed HID report)
pub const FRAME_SIZE: usize = 64;

/// Largest request payload (frame minus opcode byte)
pub const MAX_REQUEST_PAYLOAD: usize = FRAME_SIZE - 1;

/// Bytes in front of the response payload (status + echoed opcode)
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Largest response payload
pub const MAX_RESPONSE_PAYLOAD: usize = FRAME_SIZE - RESPONSE_HEADER_LEN;

// ===========================================================================
// Device limits
// ===========================================================================

/// Number of calibration slots on the device
pub const MAX_CALIBRATION_SLOTS: u16 = 64;

/// Length of the NUL-padded calibration description
pub const CALIBRATION_DESCRIPTION_LEN: usize = 23;

/// Length of the NUL-padded owner name and email fields
pub const OWNER_FIELD_LEN: usize = 60;

/// Magic that must accompany WRITE_EEPROM
pub const EEPROM_MAGIC: &[u8; 8] = b"Un1c0rn2";

/// Flash address where the runcode (application firmware) starts
pub const RUNCODE_ADDRESS: u16 = 0x4000;

/// Default bytes per WRITE_FLASH command
pub const FLASH_TRANSFER_BLOCK_SIZE: usize = 32;

/// Bytes per READ_FLASH command during verification
pub const FLASH_VERIFY_BLOCK_SIZE: usize = 60;
