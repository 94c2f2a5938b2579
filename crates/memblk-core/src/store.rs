//! Memory-resident byte store
//!
//! Owns the zero-initialized backing buffer and the guard protecting it.
//! The buffer is only reachable through the three byte-range primitives
//! (read, write, fill); every range is bounds-checked before the guard is
//! taken, so a rejected range never touches the buffer.

use crate::error::{BlockError, BlockResult};
use crate::geometry::Geometry;
use crate::stats::IoStats;

use bytes::Bytes;
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared handle to a store
pub type StoreHandle = Arc<Store>;

/// Fixed-capacity byte store addressed in sectors
///
/// Capacity and sector size are fixed at creation. The guard is acquired
/// once per primitive call, which makes each primitive atomic with respect
/// to its own range but not with respect to a sequence of calls.
pub struct Store {
    /// Capacity and sector size
    geometry: Geometry,
    /// Backing buffer, never resized
    buffer: Mutex<Box<[u8]>>,
    /// I/O statistics
    stats: IoStats,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("geometry", &self.geometry)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Create a store with a zeroed buffer of `capacity_bytes`
    ///
    /// Fails with `InvalidGeometry` if the capacity is not a non-zero
    /// multiple of a power-of-two sector size, and with `AllocationFailed`
    /// if the buffer cannot be obtained. Nothing is exposed on failure.
    pub fn create(capacity_bytes: u64, sector_size: u32) -> BlockResult<Self> {
        let geometry = Geometry::from_bytes(capacity_bytes, sector_size)?;

        let alloc_failed = || BlockError::AllocationFailed {
            bytes: capacity_bytes,
        };
        let len = usize::try_from(capacity_bytes).map_err(|_| alloc_failed())?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).map_err(|_| alloc_failed())?;
        buffer.resize(len, 0u8);

        info!(
            "Store created: {} bytes ({} sectors of {} bytes)",
            capacity_bytes,
            geometry.capacity_sectors(),
            sector_size
        );

        Ok(Self {
            geometry,
            buffer: Mutex::new(buffer.into_boxed_slice()),
            stats: IoStats::new(),
        })
    }

    /// Get the store geometry
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Get the capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.geometry.capacity_bytes()
    }

    /// Get the capacity in sectors
    pub fn capacity_sectors(&self) -> u64 {
        self.geometry.capacity_sectors()
    }

    /// Get the sector size
    pub fn sector_size(&self) -> u32 {
        self.geometry.sector_size()
    }

    /// Get the I/O statistics
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// Check that `[offset, offset + length)` lies inside the store
    pub fn check_range(&self, offset: u64, length: u64) -> BlockResult<()> {
        self.span(offset, length).map(|_| ())
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> BlockResult<()> {
        let span = self.span(offset, buf.len() as u64)?;

        let start = Instant::now();
        {
            let buffer = self.buffer.lock();
            buf.copy_from_slice(&buffer[span]);
        }
        self.stats
            .record_read(buf.len() as u64, elapsed_us(start));

        Ok(())
    }

    /// Read `length` bytes starting at `offset`
    pub fn read_range(&self, offset: u64, length: u64) -> BlockResult<Bytes> {
        let span = self.span(offset, length)?;

        let mut data = vec![0u8; span.len()];
        let start = Instant::now();
        {
            let buffer = self.buffer.lock();
            data.copy_from_slice(&buffer[span]);
        }
        self.stats.record_read(length, elapsed_us(start));

        Ok(Bytes::from(data))
    }

    /// Copy `data` into the store starting at `offset`
    pub fn write_range(&self, offset: u64, data: &[u8]) -> BlockResult<()> {
        let span = self.span(offset, data.len() as u64)?;

        let start = Instant::now();
        {
            let mut buffer = self.buffer.lock();
            buffer[span].copy_from_slice(data);
        }
        self.stats
            .record_write(data.len() as u64, elapsed_us(start));

        Ok(())
    }

    /// Set `length` bytes starting at `offset` to `value`
    pub fn fill_range(&self, offset: u64, length: u64, value: u8) -> BlockResult<()> {
        let span = self.span(offset, length)?;

        let start = Instant::now();
        {
            let mut buffer = self.buffer.lock();
            buffer[span].fill(value);
        }
        self.stats.record_fill(length, elapsed_us(start));

        Ok(())
    }

    /// Validate a range and convert it to buffer indices
    fn span(&self, offset: u64, length: u64) -> BlockResult<Range<usize>> {
        let capacity = self.capacity_bytes();
        let out_of_bounds = || {
            self.stats.record_rejected();
            debug!("Rejected range {offset}+{length} (capacity {capacity})");
            BlockError::OutOfBounds {
                offset,
                length,
                capacity,
            }
        };

        if !self.geometry.contains(offset, length) {
            return Err(out_of_bounds());
        }

        // Capacity fits in usize (checked at creation), so these cannot fail
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = usize::try_from(offset + length).map_err(|_| out_of_bounds())?;

        Ok(start..end)
    }
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Create a store and return a shared handle to it
pub fn create_store(capacity_bytes: u64, sector_size: u32) -> BlockResult<StoreHandle> {
    Store::create(capacity_bytes, sector_size).map(Arc::new)
}

/// Release a store handle
///
/// The caller must have quiesced every `execute` call that uses this
/// store. Returns `true` if this was the last handle and the buffer was
/// freed; otherwise the buffer lives until the remaining handles drop.
pub fn destroy_store(handle: StoreHandle) -> bool {
    match Arc::try_unwrap(handle) {
        Ok(store) => {
            info!(
                "Store destroyed: {} bytes released",
                store.capacity_bytes()
            );
            drop(store);
            true
        }
        Err(handle) => {
            warn!(
                "Store still referenced by {} other handle(s); buffer freed on last drop",
                Arc::strong_count(&handle) - 1
            );
            false
        }
    }
}
