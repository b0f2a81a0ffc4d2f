//! CLI command implementations
//!
//! Every command opens one device, builds a queue batch (or a flash
//! workflow) against it and prints the decoded results.

pub mod device;
pub mod flash;
pub mod list;
pub mod measure;
mod progress;

use rcolorhug_core::config::Config;
use rcolorhug_queue::ProcessFlags;
use tokio_util::sync::CancellationToken;

use crate::cli::DeviceArgs;

/// Result type for command implementations
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Settings shared by every command, after command-line overrides
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub flags: ProcessFlags,
    /// Fired on Ctrl-C
    pub cancel: CancellationToken,
}

impl Context {
    /// Merge the command-line flags into the loaded configuration
    pub fn new(mut config: Config, args: &DeviceArgs, cancel: CancellationToken) -> Self {
        if let Some(timeout_ms) = args.timeout_ms {
            config.transfer.timeout_ms = timeout_ms;
        }

        let mut flags = ProcessFlags::empty();
        if args.continue_on_error || config.process.continue_on_error {
            flags |= ProcessFlags::CONTINUE_ON_ERROR;
        }
        if args.nonfatal || config.process.nonfatal_errors {
            flags |= ProcessFlags::NONFATAL_ERRORS;
        }

        Self {
            config,
            flags,
            cancel,
        }
    }
}
