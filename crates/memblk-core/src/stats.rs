//! I/O statistics for a store
//!
//! Counters are updated with relaxed atomics outside the store's guard, so
//! a snapshot taken while requests are running is approximate.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-store I/O statistics
#[derive(Debug, Default)]
pub struct IoStats {
    /// Total read primitives
    read_ops: AtomicU64,
    /// Total write primitives
    write_ops: AtomicU64,
    /// Total fill primitives (discard / zero-fill)
    fill_ops: AtomicU64,
    /// Total bytes read
    read_bytes: AtomicU64,
    /// Total bytes written
    write_bytes: AtomicU64,
    /// Total bytes filled
    fill_bytes: AtomicU64,
    /// Ranges rejected by the bounds check
    rejected_ops: AtomicU64,
    /// Total time spent holding the guard (microseconds)
    busy_us: AtomicU64,
}

/// Point-in-time copy of [`IoStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStatsSnapshot {
    pub read_ops: u64,
    pub write_ops: u64,
    pub fill_ops: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub fill_bytes: u64,
    pub rejected_ops: u64,
    pub busy_us: u64,
}

impl IoStatsSnapshot {
    /// Total primitives that touched the buffer
    pub fn total_ops(&self) -> u64 {
        self.read_ops + self.write_ops + self.fill_ops
    }

    /// Average time under the guard per primitive, in microseconds
    pub fn avg_latency_us(&self) -> u64 {
        let ops = self.total_ops();
        if ops == 0 {
            return 0;
        }
        self.busy_us / ops
    }
}

impl IoStats {
    /// Create new I/O statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read primitive
    pub fn record_read(&self, bytes: u64, latency_us: u64) {
        self.read_ops.fetch_add(1, Ordering::Relaxed);
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.busy_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// Record a write primitive
    pub fn record_write(&self, bytes: u64, latency_us: u64) {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.busy_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// Record a fill primitive
    pub fn record_fill(&self, bytes: u64, latency_us: u64) {
        self.fill_ops.fetch_add(1, Ordering::Relaxed);
        self.fill_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.busy_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// Record a range rejected before touching the buffer
    pub fn record_rejected(&self) {
        self.rejected_ops.fetch_add(1, Ordering::Relaxed);
    }

    /// Get number of rejected ranges
    pub fn rejected_ops(&self) -> u64 {
        self.rejected_ops.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> IoStatsSnapshot {
        IoStatsSnapshot {
            read_ops: self.read_ops.load(Ordering::Relaxed),
            write_ops: self.write_ops.load(Ordering::Relaxed),
            fill_ops: self.fill_ops.load(Ordering::Relaxed),
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
            write_bytes: self.write_bytes.load(Ordering::Relaxed),
            fill_bytes: self.fill_bytes.load(Ordering::Relaxed),
            rejected_ops: self.rejected_ops.load(Ordering::Relaxed),
            busy_us: self.busy_us.load(Ordering::Relaxed),
        }
    }
}
