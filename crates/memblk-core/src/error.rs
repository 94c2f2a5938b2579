//! Block engine error types

use thiserror::Error;

/// Block engine error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Backing buffer could not be obtained
    #[error("Failed to allocate {bytes} byte backing buffer")]
    AllocationFailed { bytes: u64 },

    /// Capacity or sector size rejected at creation
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Range exceeds the store capacity
    #[error("Offset {offset} + length {length} exceeds capacity {capacity}")]
    OutOfBounds {
        offset: u64,
        length: u64,
        capacity: u64,
    },

    /// Payload segment without a usable external buffer
    #[error("Invalid segment {index}: {reason}")]
    InvalidSegment { index: usize, reason: String },

    /// Operation kind the executor does not service
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Device is attached and cannot be attached again or destroyed
    #[error("Device is attached: {0}")]
    DeviceAttached(String),

    /// Device does not accept requests in its current state
    #[error("Device is not attached: {0}")]
    DeviceNotAttached(String),
}

impl BlockError {
    /// Whether the error is reported as an I/O error on the request
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BlockError::OutOfBounds { .. } | BlockError::InvalidSegment { .. }
        )
    }
}

impl From<BlockError> for memblk_common::Error {
    fn from(err: BlockError) -> Self {
        use memblk_common::Error;

        match err {
            BlockError::AllocationFailed { bytes } => Error::AllocationFailed { bytes },
            BlockError::InvalidGeometry(msg) => Error::InvalidGeometry(msg),
            BlockError::OutOfBounds {
                offset,
                length,
                capacity,
            } => Error::OutOfBounds {
                offset,
                length,
                capacity,
            },
            e @ BlockError::InvalidSegment { .. } => Error::InvalidSegment(e.to_string()),
            BlockError::Unsupported(op) => Error::Unsupported(op),
            BlockError::DeviceAttached(name) => Error::DeviceAttached(name),
            BlockError::DeviceNotAttached(name) => Error::DeviceNotAttached(name),
        }
    }
}

/// Result type for block operations
pub type BlockResult<T> = Result<T, BlockError>;

#[cfg(test)]
mod tests {
    use super::*;
    use memblk_common::error::errno;

    #[test]
    fn test_io_error_classification() {
        assert!(
            BlockError::OutOfBounds {
                offset: 0,
                length: 1,
                capacity: 0
            }
            .is_io_error()
        );
        assert!(
            BlockError::InvalidSegment {
                index: 0,
                reason: "missing buffer".into()
            }
            .is_io_error()
        );
        assert!(!BlockError::Unsupported("flush".into()).is_io_error());
    }

    #[test]
    fn test_into_common_error() {
        let err: memblk_common::Error = BlockError::InvalidSegment {
            index: 2,
            reason: "missing buffer".into(),
        }
        .into();
        assert_eq!(err.errno(), errno::EIO);

        let err: memblk_common::Error = BlockError::AllocationFailed { bytes: 4096 }.into();
        assert_eq!(err.errno(), errno::ENOMEM);
    }
}
