//! Blocking byte pipe
//!
//! A fixed-size circular buffer shared by producers and consumers. Writers
//! wait on `writable` while the ring is full, readers wait on `readable`
//! while it is empty, and each side wakes the other after moving bytes.

use crate::error::{CharDevError, CharDevResult};

use memblk_common::config::PipeConfig;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

struct Ring {
    buffer: Box<[u8]>,
    /// Next position to write
    head: usize,
    /// Next position to read
    tail: usize,
    /// Bytes currently buffered
    count: usize,
    closed: bool,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Copy as much of `data` as fits without wrapping twice
    fn push(&mut self, data: &[u8]) -> usize {
        let free = self.capacity() - self.count;
        let contiguous = self.capacity() - self.head;
        let n = data.len().min(free).min(contiguous);

        self.buffer[self.head..self.head + n].copy_from_slice(&data[..n]);
        self.head = (self.head + n) % self.capacity();
        self.count += n;
        n
    }

    fn pop(&mut self, buf: &mut [u8]) -> usize {
        let contiguous = self.capacity() - self.tail;
        let n = buf.len().min(self.count).min(contiguous);

        buf[..n].copy_from_slice(&self.buffer[self.tail..self.tail + n]);
        self.tail = (self.tail + n) % self.capacity();
        self.count -= n;
        n
    }
}

/// Blocking producer/consumer pipe
pub struct BytePipe {
    ring: Mutex<Ring>,
    /// Signalled when bytes become available
    readable: Condvar,
    /// Signalled when space becomes available
    writable: Condvar,
}

impl BytePipe {
    /// Create a pipe with a circular buffer of `capacity` bytes
    pub fn new(capacity: usize) -> CharDevResult<Self> {
        if capacity == 0 {
            return Err(CharDevError::InvalidSize(
                "pipe capacity must be non-zero".into(),
            ));
        }

        info!("Pipe created with {capacity} byte buffer");
        Ok(Self {
            ring: Mutex::new(Ring {
                buffer: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        })
    }

    /// Create a pipe from configuration
    pub fn from_config(config: &PipeConfig) -> CharDevResult<Self> {
        Self::new(config.capacity)
    }

    /// Write all of `data`, blocking while the pipe is full
    ///
    /// Returns `data.len()` once everything is buffered. If the pipe is
    /// closed part way through, returns the bytes written so far, or
    /// `Closed` if none were.
    pub fn write(&self, data: &[u8]) -> CharDevResult<usize> {
        let mut ring = self.ring.lock();
        let mut written = 0;

        while written < data.len() {
            while ring.count == ring.capacity() && !ring.closed {
                self.writable.wait(&mut ring);
            }
            if ring.closed {
                return partial(written);
            }

            written += ring.push(&data[written..]);
            self.readable.notify_all();
        }

        Ok(written)
    }

    /// Fill `buf`, blocking while the pipe is empty
    ///
    /// Returns `buf.len()` once it is full. After close, buffered bytes are
    /// still handed out; the call then returns what it got, or `Closed` if
    /// it got nothing.
    pub fn read(&self, buf: &mut [u8]) -> CharDevResult<usize> {
        let mut ring = self.ring.lock();
        let mut read = 0;

        while read < buf.len() {
            while ring.count == 0 && !ring.closed {
                self.readable.wait(&mut ring);
            }
            if ring.count == 0 {
                return partial(read);
            }

            read += ring.pop(&mut buf[read..]);
            self.writable.notify_all();
        }

        Ok(read)
    }

    /// Close the pipe and wake every waiter
    pub fn close(&self) {
        let mut ring = self.ring.lock();
        if ring.closed {
            return;
        }
        ring.closed = true;
        debug!("Pipe closed with {} byte(s) buffered", ring.count);

        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Whether the pipe has been closed
    pub fn is_closed(&self) -> bool {
        self.ring.lock().closed
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.ring.lock().count
    }

    /// Buffer capacity
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        let ring = self.ring.lock();
        ring.count == ring.capacity()
    }
}

fn partial(done: usize) -> CharDevResult<usize> {
    if done > 0 {
        Ok(done)
    } else {
        Err(CharDevError::Closed)
    }
}

impl std::fmt::Debug for BytePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("BytePipe")
            .field("capacity", &ring.capacity())
            .field("count", &ring.count)
            .field("closed", &ring.closed)
            .finish_non_exhaustive()
    }
}
