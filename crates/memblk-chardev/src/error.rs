//! Character device error types

use thiserror::Error;

/// Character device error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CharDevError {
    /// Size rejected (zero, or smaller than the data held)
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// Requested size above the configured maximum
    #[error("Requested size {requested} exceeds maximum {max}")]
    TooLarge { requested: usize, max: usize },

    /// Control command number not recognized
    #[error("Unknown control command: {0}")]
    UnknownCommand(u32),

    /// Pipe closed while waiting, or before the call
    #[error("Pipe closed")]
    Closed,
}

impl From<CharDevError> for memblk_common::Error {
    fn from(err: CharDevError) -> Self {
        use memblk_common::Error;

        match err {
            CharDevError::InvalidSize(msg) => Error::InvalidArgument(msg),
            e @ CharDevError::TooLarge { .. } => Error::InvalidArgument(e.to_string()),
            CharDevError::UnknownCommand(cmd) => Error::UnknownCommand(cmd),
            CharDevError::Closed => Error::Closed,
        }
    }
}

impl CharDevError {
    /// Get the errno a caller of the device would see
    #[must_use]
    pub fn errno(&self) -> i32 {
        memblk_common::Error::from(self.clone()).errno()
    }
}

/// Result type for character device operations
pub type CharDevResult<T> = Result<T, CharDevError>;

#[cfg(test)]
mod tests {
    use super::*;
    use memblk_common::error::errno;

    #[test]
    fn test_chardev_errno() {
        assert_eq!(CharDevError::InvalidSize("0".into()).errno(), errno::EINVAL);
        assert_eq!(
            CharDevError::TooLarge {
                requested: 2048,
                max: 1024
            }
            .errno(),
            errno::EINVAL
        );
        assert_eq!(CharDevError::UnknownCommand(9).errno(), errno::ENOTTY);
        assert_eq!(CharDevError::Closed.errno(), errno::EPIPE);
    }

    #[test]
    fn test_into_common_error() {
        let err = memblk_common::Error::from(CharDevError::TooLarge {
            requested: 2048,
            max: 1024,
        });
        assert!(matches!(err, memblk_common::Error::InvalidArgument(_)));
        assert_eq!(
            err.to_string(),
            "invalid argument: Requested size 2048 exceeds maximum 1024"
        );
    }
}
