//! Configuration types for memblk
//!
//! Capacity and sector size are consumed once, when the store is created,
//! and are immutable afterwards.

use crate::DEFAULT_SECTOR_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Root configuration for memblk
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Block device configuration
    #[serde(default)]
    pub device: DeviceConfig,
    /// Echo character device configuration
    #[serde(default)]
    pub echo: EchoConfig,
    /// Byte pipe configuration
    #[serde(default)]
    pub pipe: PipeConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check the configuration for values the engine would reject
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;

        if self.echo.initial_size == 0 {
            return Err(Error::configuration("echo.initial_size must be positive"));
        }
        if self.echo.initial_size > self.echo.max_size {
            return Err(Error::configuration(format!(
                "echo.initial_size {} exceeds echo.max_size {}",
                self.echo.initial_size, self.echo.max_size
            )));
        }
        if self.pipe.capacity == 0 {
            return Err(Error::configuration("pipe.capacity must be positive"));
        }

        Ok(())
    }
}

/// Block device configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name reported to the attachment layer
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Total capacity in bytes
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
    /// Sector size in bytes (default: 512)
    #[serde(default = "default_sector_size")]
    pub sector_size: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            capacity_bytes: default_capacity_bytes(),
            sector_size: default_sector_size(),
        }
    }
}

impl DeviceConfig {
    /// Validate the store geometry
    pub fn validate(&self) -> Result<()> {
        if self.sector_size == 0 || !self.sector_size.is_power_of_two() {
            return Err(Error::configuration(format!(
                "sector_size {} must be a non-zero power of two",
                self.sector_size
            )));
        }
        if self.capacity_bytes == 0 {
            return Err(Error::configuration("capacity_bytes must be positive"));
        }
        if self.capacity_bytes % u64::from(self.sector_size) != 0 {
            return Err(Error::configuration(format!(
                "capacity_bytes {} is not a multiple of sector_size {}",
                self.capacity_bytes, self.sector_size
            )));
        }
        Ok(())
    }

    /// Capacity expressed in sectors
    pub fn capacity_sectors(&self) -> u64 {
        self.capacity_bytes / u64::from(self.sector_size.max(1))
    }
}

/// Echo character device configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EchoConfig {
    /// Buffer size at load time
    #[serde(default = "default_echo_size")]
    pub initial_size: usize,
    /// Largest size a grow request may ask for
    #[serde(default = "default_echo_max_size")]
    pub max_size: usize,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            initial_size: default_echo_size(),
            max_size: default_echo_max_size(),
        }
    }
}

/// Byte pipe configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Circular buffer capacity in bytes
    #[serde(default = "default_pipe_capacity")]
    pub capacity: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: default_pipe_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace / debug / info / warn / error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_device_name() -> String {
    "memblk0".to_string()
}

fn default_capacity_bytes() -> u64 {
    16 * 1024 * 1024 // 16 MB
}

fn default_sector_size() -> u32 {
    DEFAULT_SECTOR_SIZE
}

fn default_echo_size() -> usize {
    255
}

fn default_echo_max_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_pipe_capacity() -> usize {
    8192
}

fn default_log_level() -> String {
    "info".to_string()
}
