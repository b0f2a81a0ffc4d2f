//! rcolorhug-core - Core library for ColorHug colorimeter communication
//!
//! This crate provides everything needed to talk to a ColorHug-family
//! device at the packet level, without performing any I/O itself:
//!
//! - [`protocol`] - the 64-byte frame codec, opcodes, packed-float and
//!   little-endian helpers, flash payload framing and checksums
//! - [`types`] - typed views of the values exchanged with the device
//!   (calibration records, LED state, firmware version, readings)
//! - [`device`] - the [`Device`] transport capability that USB and emulated
//!   backends implement
//! - [`config`] - TOML configuration shared by the queue and the CLI
//!
//! # Example
//!
//! ```
//! use rcolorhug_core::protocol::{decode_response, encode_request, opcodes};
//!
//! let frame = encode_request(opcodes::GET_SERIAL_NUMBER, &[]).unwrap();
//! assert_eq!(frame[0], opcodes::GET_SERIAL_NUMBER);
//!
//! // status OK, echoed opcode, little-endian u32
//! let response = [0x00, opcodes::GET_SERIAL_NUMBER, 0x39, 0x05, 0x00, 0x00];
//! let payload = decode_response(&response, opcodes::GET_SERIAL_NUMBER, 4).unwrap();
//! assert_eq!(payload, &[0x39, 0x05, 0x00, 0x00]);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod types;

pub use device::{Device, DeviceId, DeviceMode, DeviceRef, Reconnect};
pub use error::{Error, Result};
