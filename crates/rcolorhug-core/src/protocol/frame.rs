//! Request encoding and response decoding

use crate::error::{Error, Result};

use super::{DeviceStatus, FRAME_SIZE, MAX_REQUEST_PAYLOAD, MAX_RESPONSE_PAYLOAD, RESPONSE_HEADER_LEN};

/// One request frame as sent on the wire
pub type Frame = [u8; FRAME_SIZE];

/// Build a request frame: opcode, payload, zero padding
pub fn encode_request(opcode: u8, payload: &[u8]) -> Result<Frame> {
    if payload.len() > MAX_REQUEST_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_REQUEST_PAYLOAD,
        });
    }

    let mut frame = [0u8; FRAME_SIZE];
    frame[0] = opcode;
    frame[1..1 + payload.len()].copy_from_slice(payload);
    Ok(frame)
}

/// Validate a response frame and return its payload
///
/// Devices answer either with a full 64-byte frame or with a short frame of
/// exactly `2 + expected_len` bytes. Both are accepted, as is anything in
/// between; the returned slice is always exactly `expected_len` bytes.
pub fn decode_response(frame: &[u8], expected_opcode: u8, expected_len: usize) -> Result<&[u8]> {
    if expected_len > MAX_RESPONSE_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            len: expected_len,
            max: MAX_RESPONSE_PAYLOAD,
        });
    }

    let min_len = RESPONSE_HEADER_LEN + expected_len;
    if frame.len() < RESPONSE_HEADER_LEN {
        return Err(Error::ShortFrame {
            expected: min_len,
            actual: frame.len(),
        });
    }
    if frame.len() > FRAME_SIZE {
        return Err(Error::OversizedFrame(frame.len()));
    }

    // The status byte wins over everything else: a failing device still
    // echoes the opcode but the payload is meaningless.
    if frame[0] != 0 {
        return Err(Error::Device {
            opcode: expected_opcode,
            status: DeviceStatus::from_u8(frame[0]),
        });
    }
    if frame[1] != expected_opcode {
        return Err(Error::ProtocolDesync {
            expected: expected_opcode,
            actual: frame[1],
        });
    }
    if frame.len() < min_len {
        return Err(Error::ShortFrame {
            expected: min_len,
            actual: frame.len(),
        });
    }

    Ok(&frame[RESPONSE_HEADER_LEN..min_len])
}
