//! Error types for memblk
//!
//! This module defines the common error taxonomy shared by the block
//! engine, the character devices and the CLI.

use thiserror::Error;

/// Common result type for memblk operations
pub type Result<T> = std::result::Result<T, Error>;

/// errno values used when reporting completions
pub mod errno {
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EBUSY: i32 = 16;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOTTY: i32 = 25;
    pub const EPIPE: i32 = 32;
    pub const EOPNOTSUPP: i32 = 95;
}

/// Common error type for memblk
#[derive(Debug, Error)]
pub enum Error {
    // Store errors
    #[error("failed to allocate {bytes} byte backing buffer")]
    AllocationFailed { bytes: u64 },

    #[error("range {offset}+{length} exceeds capacity {capacity}")]
    OutOfBounds {
        offset: u64,
        length: u64,
        capacity: u64,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    // Request errors
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    // Device lifecycle errors
    #[error("device is attached: {0}")]
    DeviceAttached(String),

    #[error("device is not attached: {0}")]
    DeviceNotAttached(String),

    // Character device errors
    #[error("unknown control command: {0}")]
    UnknownCommand(u32),

    #[error("channel closed")]
    Closed,

    // Generic errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Get the errno reported to a completion consumer
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::OutOfBounds { .. } | Self::InvalidSegment(_) => errno::EIO,

            Self::AllocationFailed { .. } => errno::ENOMEM,

            Self::DeviceAttached(_) => errno::EBUSY,

            Self::DeviceNotAttached(_) => errno::ENODEV,

            Self::InvalidGeometry(_) | Self::InvalidArgument(_) | Self::Configuration(_) => {
                errno::EINVAL
            }

            Self::UnknownCommand(_) => errno::ENOTTY,

            Self::Closed => errno::EPIPE,

            Self::Unsupported(_) => errno::EOPNOTSUPP,
        }
    }
}
