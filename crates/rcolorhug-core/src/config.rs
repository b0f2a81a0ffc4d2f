//! TOML configuration
//!
//! ```toml
//! [transfer]
//! timeout_ms = 5000
//!
//! [flash]
//! chunk_size = 32
//! reconnect_timeout_ms = 15000
//! runcode_address = "0x4000"
//!
//! [process]
//! continue_on_error = false
//! nonfatal_errors = false
//! ```
//!
//! Every section and key is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::protocol::{FLASH_TRANSFER_BLOCK_SIZE, MAX_WRITE_CHUNK, RUNCODE_ADDRESS};

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// USB transfer settings
    pub transfer: TransferConfig,
    /// Flash orchestration settings
    pub flash: FlashConfig,
    /// Default process flags
    pub process: ProcessConfig,
}

/// USB transfer settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// Per-transfer timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl TransferConfig {
    /// Timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Flash orchestration settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashConfig {
    /// Bytes per WRITE_FLASH command
    pub chunk_size: usize,
    /// How long to wait for the device to re-enumerate, in milliseconds
    pub reconnect_timeout_ms: u64,
    /// Address firmware images are written to
    #[serde(deserialize_with = "deserialize_hex_u16")]
    pub runcode_address: u16,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            chunk_size: FLASH_TRANSFER_BLOCK_SIZE,
            reconnect_timeout_ms: 15000,
            runcode_address: RUNCODE_ADDRESS,
        }
    }
}

impl FlashConfig {
    /// Reconnect timeout as a Duration
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms)
    }
}

/// Default process flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// Keep going with a device's remaining commands after one fails
    pub continue_on_error: bool,
    /// Resolve batches with failures as success
    pub nonfatal_errors: bool,
}

/// Deserialize a u16 that can be hex (0x...) or decimal
fn deserialize_hex_u16<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u16),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Str(s) => parse_u16(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_u16(s: &str) -> std::result::Result<u16, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("invalid hex value '{}': {}", s, e))
    } else {
        s.parse::<u16>()
            .map_err(|e| format!("invalid number '{}': {}", s, e))
    }
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::InvalidParameter(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load the configuration
    ///
    /// Uses `path` when given; otherwise the per-user file if it exists;
    /// otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }
        match default_path() {
            Some(path) if path.exists() => {
                log::debug!("Loading configuration from {}", path.display());
                Self::from_toml_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.flash.chunk_size == 0 || self.flash.chunk_size > MAX_WRITE_CHUNK {
            return Err(Error::InvalidParameter(format!(
                "config: flash.chunk_size must be 1..={}",
                MAX_WRITE_CHUNK
            )));
        }
        if self.transfer.timeout_ms == 0 {
            return Err(Error::InvalidParameter(
                "config: transfer.timeout_ms must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

/// `config.toml` in the platform's per-user config directory for rcolorhug
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rcolorhug").map(|dirs| dirs.config_dir().join("config.toml"))
}
