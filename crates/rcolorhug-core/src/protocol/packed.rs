//! Packed floats and little-endian field helpers
//!
//! The device has no FPU; fractional values are fixed point with 16 integer
//! bits and 16 fraction bits, scaled by 65535 and sent as a little-endian
//! `i32`.

use crate::error::{Error, Result};

/// Scale between a packed float and its real value
pub const PACKED_FLOAT_SCALE: f64 = 65535.0;

/// Largest magnitude a packed float can carry
pub const PACKED_FLOAT_MAX: f64 = 32767.0;

/// Encoded size of one packed float
pub const PACKED_FLOAT_LEN: usize = 4;

/// Convert a raw packed value to a float
pub fn to_float(raw: i32) -> f64 {
    raw as f64 / PACKED_FLOAT_SCALE
}

/// Convert a float to its raw packed value
///
/// Values outside `[-32767, 32767]` (and NaN) are rejected rather than
/// saturated.
pub fn from_float(value: f64) -> Result<i32> {
    if !(-PACKED_FLOAT_MAX..=PACKED_FLOAT_MAX).contains(&value) {
        return Err(Error::PackedFloatRange(value));
    }
    Ok((value * PACKED_FLOAT_SCALE).round() as i32)
}

/// Check a slice of values without encoding them
pub fn validate(values: &[f64]) -> Result<()> {
    for &v in values {
        from_float(v)?;
    }
    Ok(())
}

/// Append a packed float to a payload
pub fn put_packed(buf: &mut Vec<u8>, value: f64) -> Result<()> {
    buf.extend_from_slice(&from_float(value)?.to_le_bytes());
    Ok(())
}

/// Read a packed float at `offset`
pub fn get_packed(buf: &[u8], offset: usize) -> f64 {
    to_float(i32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

/// Read a little-endian u16 at `offset`
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Read a little-endian u32 at `offset`
pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Append a little-endian u16
pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian u32
pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append `text` NUL-padded to exactly `len` bytes
pub fn put_fixed_str(buf: &mut Vec<u8>, text: &str, len: usize) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() > len {
        return Err(Error::InvalidParameter(format!(
            "string of {} bytes exceeds {} byte field",
            bytes.len(),
            len
        )));
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + len - bytes.len(), 0);
    Ok(())
}

/// Decode a NUL-padded string field
pub fn get_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
