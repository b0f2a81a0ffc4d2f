//! Error types for queue operations

use std::fmt;

use rcolorhug_core::protocol::opcodes;
use rcolorhug_core::DeviceId;
use thiserror::Error;

use crate::flash::FlashStep;

/// One command that failed during a batch
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    /// Device the command was sent to
    pub device: DeviceId,
    /// Opcode of the command
    pub opcode: u8,
    /// Why it failed
    pub error: rcolorhug_core::Error,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl CommandFailure {
    /// Longer description naming the device and command
    pub fn describe(&self) -> String {
        format!(
            "{} ({} on {})",
            self.error,
            opcodes::name(self.opcode),
            self.device
        )
    }
}

/// Queue-level errors
#[derive(Debug, Error)]
pub enum Error {
    /// A command could not be built
    #[error(transparent)]
    Command(#[from] rcolorhug_core::Error),

    /// One or more commands in the batch failed
    #[error("{} failures: {}", .failures.len(), join(.failures))]
    Batch {
        /// Every failure, in completion order
        failures: Vec<CommandFailure>,
    },

    /// The batch was cancelled
    #[error("cancelled with {} failures: {}", .failures.len(), join(.failures))]
    Cancelled {
        /// Failures recorded before and during cancellation
        failures: Vec<CommandFailure>,
    },

    /// Blocking processing was requested from inside an async runtime
    #[error("process_sync called from inside an async runtime")]
    Reentrant,

    /// The private runtime could not be created
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A flash workflow step failed
    #[error("{step} failed: {source}")]
    Flash {
        /// Step that failed
        step: FlashStep,
        /// Underlying error
        source: Box<Error>,
    },
}

impl Error {
    /// Failures carried by a batch outcome
    pub fn failures(&self) -> &[CommandFailure] {
        match self {
            Error::Batch { failures } | Error::Cancelled { failures } => failures,
            Error::Flash { source, .. } => source.failures(),
            _ => &[],
        }
    }
}

fn join(failures: &[CommandFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, Error>;
