//! Sector geometry
//!
//! Maps sector numbers to byte offsets within a store.

use crate::error::{BlockError, BlockResult};

/// Capacity and sector size of a store, as reported at attachment time
///
/// ```text
/// Store (4096 bytes, 512-byte sectors)
/// ├── Sector 0:  bytes 0    - 512
/// ├── Sector 1:  bytes 512  - 1024
/// │   ...
/// └── Sector 7:  bytes 3584 - 4096
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Sector size in bytes
    sector_size: u32,
    /// Capacity in sectors
    capacity_sectors: u64,
}

impl Geometry {
    /// Build a geometry from a byte capacity
    ///
    /// The sector size must be a non-zero power of two and the capacity a
    /// non-zero multiple of it.
    pub fn from_bytes(capacity_bytes: u64, sector_size: u32) -> BlockResult<Self> {
        if sector_size == 0 || !sector_size.is_power_of_two() {
            return Err(BlockError::InvalidGeometry(format!(
                "sector size {sector_size} must be a non-zero power of two"
            )));
        }
        if capacity_bytes == 0 {
            return Err(BlockError::InvalidGeometry(
                "capacity must be positive".to_string(),
            ));
        }
        if capacity_bytes % u64::from(sector_size) != 0 {
            return Err(BlockError::InvalidGeometry(format!(
                "capacity {capacity_bytes} is not a multiple of sector size {sector_size}"
            )));
        }

        Ok(Self {
            sector_size,
            capacity_sectors: capacity_bytes / u64::from(sector_size),
        })
    }

    /// Get the sector size
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Get the capacity in sectors
    pub fn capacity_sectors(&self) -> u64 {
        self.capacity_sectors
    }

    /// Get the capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_sectors * u64::from(self.sector_size)
    }

    /// Convert a sector number to a byte offset
    ///
    /// Returns `None` if the offset does not fit in a `u64`.
    pub fn sector_to_offset(&self, sector: u64) -> Option<u64> {
        sector.checked_mul(u64::from(self.sector_size))
    }

    /// Check whether `[offset, offset + length)` lies inside the capacity
    pub fn contains(&self, offset: u64, length: u64) -> bool {
        offset
            .checked_add(length)
            .is_some_and(|end| end <= self.capacity_bytes())
    }
}
