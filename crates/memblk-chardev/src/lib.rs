//! memblk Character Devices
//!
//! Two small byte-oriented devices that sit next to the block engine:
//!
//! - **EchoDevice**: a buffer that returns what was last written, with a
//!   control call to query its size and resize it. Resizing happens under
//!   the same lock as reads and writes, so no caller can hold a stale
//!   buffer while it is replaced.
//! - **BytePipe**: a blocking producer/consumer pipe over a fixed-size
//!   circular buffer, with one wait condition for readers and one for
//!   writers.

pub mod echo;
pub mod error;
pub mod pipe;

pub use echo::{EchoControl, EchoDevice, EchoReply};
pub use error::{CharDevError, CharDevResult};
pub use pipe::BytePipe;
