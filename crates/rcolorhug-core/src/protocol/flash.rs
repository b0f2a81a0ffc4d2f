//! Flash payload framing
//!
//! ```text
//! ERASE_FLASH request:  [addr:u16][len:u16]
//! WRITE_FLASH request:  [addr:u16][len:u8][checksum:u8][data; len]
//! READ_FLASH  request:  [addr:u16][len:u8]
//! READ_FLASH  response: [checksum:u8][data; len]
//! ```
//!
//! The checksum is `0xFF` XOR-folded with every data byte.

use crate::error::{Error, Result};

use super::packed::put_u16;
use super::{MAX_REQUEST_PAYLOAD, MAX_RESPONSE_PAYLOAD};

/// Bytes of data that fit in one WRITE_FLASH frame
pub const MAX_WRITE_CHUNK: usize = MAX_REQUEST_PAYLOAD - 4;

/// Bytes of data one READ_FLASH command may ask for
pub const MAX_READ_CHUNK: usize = MAX_RESPONSE_PAYLOAD - 2;

/// Checksum used by the flash commands
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0xff, |acc, b| acc ^ b)
}

/// Build an ERASE_FLASH payload
pub fn erase_flash_payload(addr: u16, len: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    put_u16(&mut buf, addr);
    put_u16(&mut buf, len);
    buf
}

/// Build a WRITE_FLASH payload for one chunk
pub fn write_flash_payload(addr: u16, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() > MAX_WRITE_CHUNK {
        return Err(Error::InvalidParameter(format!(
            "flash write chunk of {} bytes (must be 1..={})",
            data.len(),
            MAX_WRITE_CHUNK
        )));
    }
    let mut buf = Vec::with_capacity(4 + data.len());
    put_u16(&mut buf, addr);
    buf.push(data.len() as u8);
    buf.push(checksum(data));
    buf.extend_from_slice(data);
    Ok(buf)
}

/// Build a READ_FLASH payload for one chunk
pub fn read_flash_payload(addr: u16, len: usize) -> Result<Vec<u8>> {
    if len == 0 || len > MAX_READ_CHUNK {
        return Err(Error::InvalidParameter(format!(
            "flash read chunk of {} bytes (must be 1..={})",
            len, MAX_READ_CHUNK
        )));
    }
    let mut buf = Vec::with_capacity(3);
    put_u16(&mut buf, addr);
    buf.push(len as u8);
    Ok(buf)
}

/// Check a READ_FLASH response payload and return the data part
///
/// `addr` is only used to make the error point at the failing chunk.
pub fn decode_read_flash(addr: u16, payload: &[u8]) -> Result<&[u8]> {
    let (&expected, data) = payload.split_first().ok_or(Error::ShortFrame {
        expected: 1,
        actual: 0,
    })?;
    let actual = checksum(data);
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            addr,
            expected,
            actual,
        });
    }
    Ok(data)
}
