//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal usize
fn parse_hex_usize(s: &str) -> Result<usize, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<usize>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "rcolorhug")]
#[command(author, version, about = "ColorHug colorimeter tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML format)
    /// Defaults to rcolorhug/config.toml in the user config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection and batch options shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Device to use: a USB bus and port path (e.g. 1-2.4) or "dummy"
    /// Defaults to the first ColorHug found
    #[arg(short, long)]
    pub device: Option<String>,

    /// Per-transfer timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Keep sending a device's remaining commands after one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Report command failures without failing the whole batch
    #[arg(long)]
    pub nonfatal: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected ColorHug devices
    List,

    /// Show firmware version, hardware version and serial number
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Show the contents of a calibration slot
    GetCalibration {
        #[command(flatten)]
        device: DeviceArgs,

        /// Calibration slot (0-63)
        #[arg(short, long, default_value = "0")]
        slot: u16,
    },

    /// Set the LEDs
    SetLeds {
        #[command(flatten)]
        device: DeviceArgs,

        /// Turn the red LED on
        #[arg(long)]
        red: bool,

        /// Turn the green LED on
        #[arg(long)]
        green: bool,

        /// Number of times to blink (0 for steady)
        #[arg(long, default_value = "0")]
        repeat: u8,

        /// On time per blink, in units of 10ms
        #[arg(long, default_value = "10")]
        on_time: u8,

        /// Off time per blink, in units of 10ms
        #[arg(long, default_value = "10")]
        off_time: u8,
    },

    /// Take a reading
    TakeReading {
        #[command(flatten)]
        device: DeviceArgs,

        /// Return XYZ corrected with this calibration slot instead of RGB
        #[arg(short, long)]
        slot: Option<u16>,
    },

    /// Read flash contents to file
    ReadFlash {
        #[command(flatten)]
        device: DeviceArgs,

        /// Start address (hex, e.g. 0x4000)
        #[arg(long, value_parser = parse_hex_u16, default_value = "0x4000")]
        addr: u16,

        /// Number of bytes to read (hex or decimal)
        #[arg(long, value_parser = parse_hex_usize)]
        len: usize,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Erase, write and verify a file in flash (bootloader mode only)
    WriteFlash {
        #[command(flatten)]
        device: DeviceArgs,

        /// Start address (hex, e.g. 0x4000)
        #[arg(long, value_parser = parse_hex_u16, default_value = "0x4000")]
        addr: u16,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Bytes per write command (1-59)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Install a firmware image
    Upgrade {
        #[command(flatten)]
        device: DeviceArgs,

        /// Firmware image (raw binary)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run the device self test
    SelfTest {
        #[command(flatten)]
        device: DeviceArgs,
    },
}
