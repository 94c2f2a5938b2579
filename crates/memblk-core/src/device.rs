//! Device attachment and lifecycle
//!
//! Wraps a store handle with the contract the host I/O layer relies on:
//! geometry is reported once at attach time, each submitted request gets
//! exactly one completion, and detaching waits until no request is in
//! flight so the store can be destroyed safely afterwards.

use crate::error::{BlockError, BlockResult};
use crate::executor::execute;
use crate::geometry::Geometry;
use crate::request::{Outcome, Request, RequestState};
use crate::store::{StoreHandle, destroy_store};

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Store exists, not yet attached
    Created,
    /// Accepting requests
    Attached,
    /// Refusing new requests, waiting for in-flight ones
    Detaching,
    /// Quiesced; safe to destroy or attach again
    Detached,
}

/// Completion signal for one submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Submission tag, unique per device
    pub tag: u64,
    /// Result of executing the request
    pub outcome: Outcome,
}

struct DeviceInner {
    state: DeviceState,
    in_flight: usize,
    open_count: u32,
}

/// A named block device backed by a store
pub struct BlockDevice {
    name: String,
    store: StoreHandle,
    inner: Mutex<DeviceInner>,
    /// Signalled when `in_flight` drops to zero
    drained: Condvar,
    next_tag: AtomicU64,
}

/// One accepted request; decrements the in-flight count when dropped
struct InFlightGuard<'a> {
    device: &'a BlockDevice,
    tag: u64,
    state: RequestState,
}

impl InFlightGuard<'_> {
    fn advance(&mut self, next: RequestState) {
        match self.state.advance(next) {
            Some(state) => self.state = state,
            None => warn!(
                "Device '{}' tag {}: illegal transition {:?} -> {:?}",
                self.device.name, self.tag, self.state, next
            ),
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                "Device '{}' tag {} abandoned while {:?}",
                self.device.name, self.tag, self.state
            );
        }

        let mut inner = self.device.inner.lock();
        inner.in_flight -= 1;
        if inner.in_flight == 0 {
            self.device.drained.notify_all();
        }
    }
}

impl BlockDevice {
    /// Create a device over `store`; it accepts no requests until attached
    pub fn new(name: impl Into<String>, store: StoreHandle) -> Self {
        Self {
            name: name.into(),
            store,
            inner: Mutex::new(DeviceInner {
                state: DeviceState::Created,
                in_flight: 0,
                open_count: 0,
            }),
            drained: Condvar::new(),
            next_tag: AtomicU64::new(0),
        }
    }

    /// Get the device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state
    pub fn state(&self) -> DeviceState {
        self.inner.lock().state
    }

    /// Get the store geometry
    pub fn geometry(&self) -> Geometry {
        self.store.geometry()
    }

    /// Get the backing store handle
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Number of requests currently executing
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Number of open handles
    pub fn open_count(&self) -> u32 {
        self.inner.lock().open_count
    }

    /// Attach the device and report its geometry
    pub fn attach(&self) -> BlockResult<Geometry> {
        let mut inner = self.inner.lock();
        match inner.state {
            DeviceState::Created | DeviceState::Detached => {
                inner.state = DeviceState::Attached;
            }
            DeviceState::Attached | DeviceState::Detaching => {
                return Err(BlockError::DeviceAttached(self.name.clone()));
            }
        }

        let geometry = self.geometry();
        info!(
            "Device '{}' attached: {} sectors of {} bytes",
            self.name,
            geometry.capacity_sectors(),
            geometry.sector_size()
        );
        Ok(geometry)
    }

    /// Open a handle on the attached device
    ///
    /// Returns the open count after this call.
    pub fn open(&self) -> BlockResult<u32> {
        let mut inner = self.inner.lock();
        if inner.state != DeviceState::Attached {
            return Err(BlockError::DeviceNotAttached(self.name.clone()));
        }

        inner.open_count += 1;
        if inner.open_count == 1 {
            info!("Device '{}' first open", self.name);
        }
        Ok(inner.open_count)
    }

    /// Release a handle
    ///
    /// Returns the open count after this call.
    pub fn release(&self) -> u32 {
        let mut inner = self.inner.lock();
        if inner.open_count == 0 {
            return 0;
        }

        inner.open_count -= 1;
        if inner.open_count == 0 {
            info!("Device '{}' last close", self.name);
        }
        inner.open_count
    }

    /// Execute a request and deliver its completion
    ///
    /// `on_complete` is called exactly once, on the calling thread, before
    /// this returns. Returns the submission tag, or `DeviceNotAttached` if
    /// the device is not accepting requests (the callback is then not
    /// called).
    pub fn submit<F>(&self, request: Request<'_>, on_complete: F) -> BlockResult<u64>
    where
        F: FnOnce(Completion),
    {
        // Completion delivery counts as in flight
        let mut guard = self.begin()?;
        let completion = self.complete(&mut guard, request);
        let tag = completion.tag;
        on_complete(completion);
        Ok(tag)
    }

    /// Execute a request and return its outcome directly
    pub fn submit_wait(&self, request: Request<'_>) -> BlockResult<Outcome> {
        let mut guard = self.begin()?;
        Ok(self.complete(&mut guard, request).outcome)
    }

    fn begin(&self) -> BlockResult<InFlightGuard<'_>> {
        let mut inner = self.inner.lock();
        if inner.state != DeviceState::Attached {
            return Err(BlockError::DeviceNotAttached(self.name.clone()));
        }
        inner.in_flight += 1;
        Ok(InFlightGuard {
            device: self,
            tag: self.next_tag.fetch_add(1, Ordering::Relaxed),
            state: RequestState::Pending,
        })
    }

    fn complete(&self, guard: &mut InFlightGuard<'_>, request: Request<'_>) -> Completion {
        guard.advance(RequestState::InProgress);
        let outcome = execute(&self.store, request);
        guard.advance(outcome.state());
        debug!(
            "Device '{}' completed tag {}: {:?}",
            self.name, guard.tag, guard.state
        );
        Completion {
            tag: guard.tag,
            outcome,
        }
    }

    /// Stop accepting requests and wait for in-flight ones to finish
    pub fn detach(&self) -> BlockResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != DeviceState::Attached {
            return Err(BlockError::DeviceNotAttached(self.name.clone()));
        }

        inner.state = DeviceState::Detaching;
        if inner.in_flight > 0 {
            debug!(
                "Device '{}' waiting for {} in-flight request(s)",
                self.name, inner.in_flight
            );
        }
        while inner.in_flight > 0 {
            self.drained.wait(&mut inner);
        }

        inner.state = DeviceState::Detached;
        inner.open_count = 0;
        info!("Device '{}' detached", self.name);
        Ok(())
    }

    /// Destroy the device and release its store handle
    ///
    /// Refused while attached. Returns whether the store buffer was freed
    /// (it is not if another store handle is still held elsewhere).
    pub fn destroy(self) -> BlockResult<bool> {
        let state = self.state();
        if matches!(state, DeviceState::Attached | DeviceState::Detaching) {
            return Err(BlockError::DeviceAttached(self.name));
        }

        info!("Device '{}' destroyed", self.name);
        Ok(destroy_store(self.store))
    }
}

impl std::fmt::Debug for BlockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDevice")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("geometry", &self.geometry())
            .finish_non_exhaustive()
    }
}
