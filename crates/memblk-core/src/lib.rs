//! memblk Block Engine
//!
//! This crate provides a fixed-capacity, memory-resident byte store
//! addressed in fixed-size sectors, and an executor that runs
//! scatter/gather requests (read, write, discard, zero-fill) against it
//! under concurrent access.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Caller      │  builds a Request (operation, start sector, segments)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   BlockDevice   │  attach / submit / detach, in-flight accounting
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │    executor     │  per-segment bounds checks, dispatch, Outcome
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │      Store      │  zeroed buffer + guard, read/write/fill primitives
//! └─────────────────┘
//! ```
//!
//! # Atomicity
//!
//! The store's guard is taken once per byte-range primitive, not once per
//! request. A multi-segment read can observe a concurrent writer between
//! two of its segments (a torn read). Discard and zero-fill are a single
//! fill call and are atomic across their whole range.

pub mod device;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod request;
pub mod stats;
pub mod store;

pub use device::{BlockDevice, Completion, DeviceState};
pub use error::{BlockError, BlockResult};
pub use executor::execute;
pub use geometry::Geometry;
pub use request::{Operation, Outcome, PayloadBuf, Request, RequestState, Segment, Status};
pub use stats::{IoStats, IoStatsSnapshot};
pub use store::{Store, StoreHandle, create_store, destroy_store};
