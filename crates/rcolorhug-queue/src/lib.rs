//! rcolorhug-queue - Command queue for ColorHug colorimeters
//!
//! Turns typed device operations into frames, runs them against one or more
//! devices with at most one transfer in flight per device, decodes the
//! responses and reports a single outcome for the whole batch.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rcolorhug_core::types::FirmwareVersion;
//! use rcolorhug_core::DeviceRef;
//! use rcolorhug_dummy::DummyDevice;
//! use rcolorhug_queue::{CommandQueue, ProcessFlags};
//!
//! # async fn example() -> rcolorhug_queue::Result<()> {
//! let device: DeviceRef = Arc::new(DummyDevice::new_default());
//!
//! let mut version = FirmwareVersion::default();
//! let mut serial = 0u32;
//! {
//!     let mut queue = CommandQueue::new();
//!     queue.get_firmware_version(&device, &mut version);
//!     queue.get_serial_number(&device, &mut serial);
//!     queue.process(ProcessFlags::empty()).await?;
//! }
//! println!("firmware {} serial {}", version, serial);
//! # Ok(())
//! # }
//! ```
//!
//! Multi-step flash operations live in [`flash`].

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod command;
mod dispatch;
mod error;
pub mod flash;
mod queue;

pub use command::{OutputTarget, Transform};
pub use dispatch::{ProcessEvent, ProcessFlags, ProcessOptions};
pub use error::{CommandFailure, Error, Result};
pub use flash::{FlashEvent, FlashOrchestrator, FlashStep};
pub use queue::{CommandQueue, DEFAULT_TIMEOUT};
pub use rcolorhug_core::Reconnect;
