//! Echo device
//!
//! Returns whatever was last written to it. The buffer starts out filled
//! with spaces; a write replaces content from position 0 and is truncated
//! to the buffer size. The buffer can be queried and grown through
//! [`EchoDevice::control`].

use crate::error::{CharDevError, CharDevResult};

use memblk_common::config::EchoConfig;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Fill byte for fresh buffer space
const BLANK: u8 = b' ';

/// Control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoControl {
    /// Query the buffer size, the most a write can store
    MaxSize,
    /// Query the length of the data currently held
    CurrentLength,
    /// Resize the buffer to the given size, keeping the held data
    Grow(usize),
}

impl EchoControl {
    /// Raw command number for [`EchoControl::MaxSize`]
    pub const RAW_MAX_SIZE: u32 = 0;
    /// Raw command number for [`EchoControl::CurrentLength`]
    pub const RAW_CURRENT_LENGTH: u32 = 1;
    /// Raw command number for [`EchoControl::Grow`]
    pub const RAW_GROW: u32 = 2;

    /// Decode a raw command number and argument
    ///
    /// `arg` is only used by `Grow`.
    pub fn from_raw(cmd: u32, arg: u64) -> CharDevResult<Self> {
        match cmd {
            Self::RAW_MAX_SIZE => Ok(Self::MaxSize),
            Self::RAW_CURRENT_LENGTH => Ok(Self::CurrentLength),
            Self::RAW_GROW => usize::try_from(arg)
                .map(Self::Grow)
                .map_err(|_| CharDevError::InvalidSize(format!("{arg} does not fit in memory"))),
            other => Err(CharDevError::UnknownCommand(other)),
        }
    }
}

/// Control reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoReply {
    MaxSize(usize),
    CurrentLength(usize),
    Resized { old: usize, new: usize },
}

struct EchoState {
    buffer: Vec<u8>,
    /// Bytes of `buffer` holding written data
    len: usize,
}

/// Echo character device
pub struct EchoDevice {
    state: RwLock<EchoState>,
    max_size: usize,
    open_count: AtomicU32,
}

impl EchoDevice {
    /// Create an echo device with a blank buffer of `initial_size` bytes
    pub fn new(initial_size: usize, max_size: usize) -> CharDevResult<Self> {
        if initial_size == 0 {
            return Err(CharDevError::InvalidSize(
                "initial size must be non-zero".into(),
            ));
        }
        if initial_size > max_size {
            return Err(CharDevError::TooLarge {
                requested: initial_size,
                max: max_size,
            });
        }

        Ok(Self {
            state: RwLock::new(EchoState {
                buffer: vec![BLANK; initial_size],
                len: 0,
            }),
            max_size,
            open_count: AtomicU32::new(0),
        })
    }

    /// Create an echo device from configuration
    pub fn from_config(config: &EchoConfig) -> CharDevResult<Self> {
        Self::new(config.initial_size, config.max_size)
    }

    /// Current buffer size
    pub fn size(&self) -> usize {
        self.state.read().buffer.len()
    }

    /// Largest size a grow may ask for
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Length of the data held
    pub fn len(&self) -> usize {
        self.state.read().len
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a handle; returns the open count after this call
    pub fn open(&self) -> u32 {
        let count = self.open_count.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Echo device opened ({count} open)");
        count
    }

    /// Release a handle; returns the open count after this call
    pub fn release(&self) -> u32 {
        let previous = self
            .open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        let count = previous.saturating_sub(1);
        debug!("Echo device released ({count} open)");
        count
    }

    /// Number of open handles
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Acquire)
    }

    /// Replace the held data with `data`, truncated to the buffer size
    ///
    /// Returns the number of bytes stored.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut state = self.state.write();
        let n = data.len().min(state.buffer.len());
        state.buffer[..n].copy_from_slice(&data[..n]);
        state.len = n;

        if n < data.len() {
            debug!("Echo write truncated: {} of {} bytes", n, data.len());
        }
        n
    }

    /// Read up to `max` held bytes starting at `offset`
    pub fn read(&self, offset: usize, max: usize) -> Vec<u8> {
        let state = self.state.read();
        if offset >= state.len {
            return Vec::new();
        }
        let end = state.len.min(offset.saturating_add(max));
        state.buffer[offset..end].to_vec()
    }

    /// Execute a control command
    pub fn control(&self, cmd: EchoControl) -> CharDevResult<EchoReply> {
        match cmd {
            EchoControl::MaxSize => Ok(EchoReply::MaxSize(self.size())),
            EchoControl::CurrentLength => Ok(EchoReply::CurrentLength(self.len())),
            EchoControl::Grow(new_size) => self.grow(new_size),
        }
    }

    fn grow(&self, new_size: usize) -> CharDevResult<EchoReply> {
        if new_size > self.max_size {
            return Err(CharDevError::TooLarge {
                requested: new_size,
                max: self.max_size,
            });
        }

        // Held for the whole resize; readers never see the old buffer
        let mut state = self.state.write();
        if new_size == 0 || new_size < state.len {
            return Err(CharDevError::InvalidSize(format!(
                "{new_size} is smaller than held data ({} bytes)",
                state.len
            )));
        }

        let old = state.buffer.len();
        state.buffer.resize(new_size, BLANK);
        info!("Echo buffer resized: {old} -> {new_size} bytes");

        Ok(EchoReply::Resized { old, new: new_size })
    }
}

impl std::fmt::Debug for EchoDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("EchoDevice")
            .field("size", &state.buffer.len())
            .field("len", &state.len)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}
