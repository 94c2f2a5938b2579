//! Request executor
//!
//! Walks a request against a [`Store`] and produces one [`Outcome`].
//!
//! - **Read / Write**: segments are processed in order with a running
//!   device offset. Zero-length segments are skipped. The first segment that
//!   fails its bounds check or carries no usable buffer aborts the request;
//!   later segments are never attempted and earlier ones are not rolled back.
//! - **Discard / ZeroFill**: the total length is filled with one store call,
//!   so the whole range is atomic with respect to other requests.
//! - **Anything else**: rejected as unsupported without touching the store.
//!
//! The executor holds no state and can be called from any number of
//! threads against the same store.

use crate::error::{BlockError, BlockResult};
use crate::request::{Operation, Outcome, PayloadBuf, Request, Segment};
use crate::store::Store;

use tracing::{debug, warn};

/// Execute a request against a store
pub fn execute(store: &Store, request: Request<'_>) -> Outcome {
    let operation = request.operation();
    debug!(
        "Executing {} at sector {} ({} segments)",
        operation,
        request.start_sector(),
        request.segments().len()
    );

    match operation {
        Operation::Discard | Operation::ZeroFill => execute_fill(store, &request),
        Operation::Read | Operation::Write => execute_transfer(store, request),
        Operation::Other(code) => {
            warn!("Rejecting unsupported command {code}");
            Outcome::unsupported(operation)
        }
    }
}

/// Byte offset of a sector, saturating so an overflowing start fails the
/// bounds check instead of wrapping
fn start_offset(store: &Store, start_sector: u64) -> u64 {
    store
        .geometry()
        .sector_to_offset(start_sector)
        .unwrap_or(u64::MAX)
}

fn execute_fill(store: &Store, request: &Request<'_>) -> Outcome {
    let offset = start_offset(store, request.start_sector());

    let Some(length) = request.total_length() else {
        let err = BlockError::OutOfBounds {
            offset,
            length: u64::MAX,
            capacity: store.capacity_bytes(),
        };
        warn!("{} failed: {err}", request.operation());
        return Outcome::io_error(err, 0, 0);
    };

    if length == 0 {
        return Outcome::ok(0, request.segments().len());
    }

    match store.fill_range(offset, length, 0) {
        Ok(()) => Outcome::ok(length, request.segments().len()),
        Err(err) => {
            warn!("{} failed: {err}", request.operation());
            Outcome::io_error(err, 0, 0)
        }
    }
}

fn execute_transfer(store: &Store, request: Request<'_>) -> Outcome {
    let operation = request.operation();
    let mut device_offset = start_offset(store, request.start_sector());
    let mut bytes_transferred = 0u64;
    let mut segments_completed = 0usize;

    for (index, segment) in request.into_segments().into_iter().enumerate() {
        let length = segment.length();
        if length == 0 {
            segments_completed += 1;
            continue;
        }

        // Bounds are checked before the buffer is looked at; the primitive
        // checks again under its own call
        let result = store
            .check_range(device_offset, length)
            .and_then(|()| payload(operation, index, segment))
            .and_then(|buffer| match buffer {
                PayloadBuf::Sink(buf) => store.read_into(device_offset, buf),
                PayloadBuf::Source(data) => store.write_range(device_offset, data),
            });

        if let Err(err) = result {
            warn!("{operation} failed at segment {index}: {err}");
            return Outcome::io_error(err, bytes_transferred, segments_completed);
        }

        // In bounds, so the end cannot overflow
        device_offset += length;
        bytes_transferred += length;
        segments_completed += 1;
    }

    Outcome::ok(bytes_transferred, segments_completed)
}

/// Extract the external buffer of a transfer segment, trimmed to its length
fn payload<'a>(
    operation: Operation,
    index: usize,
    segment: Segment<'a>,
) -> BlockResult<PayloadBuf<'a>> {
    let invalid = |reason: &str| BlockError::InvalidSegment {
        index,
        reason: reason.to_string(),
    };

    let Segment::Payload { buffer, length } = segment else {
        return Err(invalid("range segment in a transfer request"));
    };
    let buffer = buffer.ok_or_else(|| invalid("missing external buffer"))?;

    let len = usize::try_from(length).map_err(|_| invalid("length exceeds address space"))?;
    if buffer.len() < len {
        return Err(invalid("external buffer shorter than segment"));
    }

    match (operation, buffer) {
        (Operation::Read, PayloadBuf::Sink(buf)) => Ok(PayloadBuf::Sink(&mut buf[..len])),
        (Operation::Write, PayloadBuf::Source(data)) => Ok(PayloadBuf::Source(&data[..len])),
        (Operation::Read, PayloadBuf::Source(_)) => Err(invalid("read into a source buffer")),
        (Operation::Write, PayloadBuf::Sink(_)) => Err(invalid("write from a sink buffer")),
        (op, _) => Err(BlockError::Unsupported(op.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{RequestState, Status};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn store() -> Store {
        Store::create(4096, 512).unwrap()
    }

    fn contents(store: &Store) -> Vec<u8> {
        store.read_range(0, store.capacity_bytes()).unwrap().to_vec()
    }

    #[test]
    fn test_write_then_read_sector_zero() {
        let store = store();
        let data = [0xAA; 512];

        let outcome = execute(&store, Request::write(0).segment(Segment::source(&data)));
        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(outcome.bytes_transferred, 512);

        let mut buf = [0u8; 512];
        let outcome = execute(&store, Request::read(0).segment(Segment::sink(&mut buf)));
        assert!(outcome.is_ok());
        assert_eq!(buf, [0xAA; 512]);
    }

    #[test]
    fn test_write_past_capacity_changes_nothing() {
        let store = store();
        let data = [0xAA; 1024];

        // offset 3584, end 4608 > 4096
        let outcome = execute(&store, Request::write(7).segment(Segment::source(&data)));
        assert_eq!(outcome.status, Status::IoError);
        assert_eq!(outcome.state(), RequestState::Failed);
        assert!(matches!(
            outcome.error,
            Some(BlockError::OutOfBounds {
                offset: 3584,
                length: 1024,
                capacity: 4096
            })
        ));
        assert!(contents(&store).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_no_rollback_of_prior_segments() {
        let store = store();
        let first = [0x11; 100];
        let second = [0x22; 4000];

        let outcome = execute(
            &store,
            Request::write(0)
                .segment(Segment::source(&first))
                .segment(Segment::source(&second)),
        );
        assert_eq!(outcome.status, Status::IoError);
        assert_eq!(outcome.segments_completed, 1);
        assert_eq!(outcome.bytes_transferred, 100);

        let bytes = contents(&store);
        assert!(bytes[..100].iter().all(|&b| b == 0x11));
        assert!(bytes[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_later_segments_not_attempted() {
        let store = store();
        let a = [0x11; 512];
        let b = [0x22; 8192];
        let c = [0x33; 512];

        let outcome = execute(
            &store,
            Request::new(
                Operation::Write,
                0,
                vec![
                    Segment::source(&a),
                    Segment::source(&b),
                    // Would be in bounds on its own at offset 0
                    Segment::source(&c),
                ],
            ),
        );
        assert_eq!(outcome.status, Status::IoError);

        let bytes = contents(&store);
        assert!(bytes[..512].iter().all(|&b| b == 0x11));
        assert!(bytes[512..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_length_segments_skipped() {
        let store = store();
        let empty: [u8; 0] = [];
        let data = [0x5A; 10];

        let outcome = execute(
            &store,
            Request::write(1)
                .segment(Segment::source(&empty))
                .segment(Segment::payload(None, 0))
                .segment(Segment::source(&data))
                .segment(Segment::source(&empty)),
        );
        assert!(outcome.is_ok());
        assert_eq!(outcome.segments_completed, 4);
        assert_eq!(outcome.bytes_transferred, 10);

        // Zero-length segments did not move the offset
        let bytes = contents(&store);
        assert!(bytes[512..522].iter().all(|&b| b == 0x5A));
        assert_eq!(bytes[511], 0);
        assert_eq!(bytes[522], 0);
    }

    #[test]
    fn test_zero_length_only_request_past_end() {
        let store = store();
        let outcome = execute(
            &store,
            Request::read(1000).segment(Segment::payload(None, 0)),
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_missing_buffer_is_io_error() {
        let store = store();
        let data = [0x77; 16];

        let outcome = execute(
            &store,
            Request::write(0)
                .segment(Segment::source(&data))
                .segment(Segment::payload(None, 16))
                .segment(Segment::source(&data)),
        );
        assert_eq!(outcome.status, Status::IoError);
        assert!(matches!(
            outcome.error,
            Some(BlockError::InvalidSegment { index: 1, .. })
        ));

        let bytes = contents(&store);
        assert!(bytes[..16].iter().all(|&b| b == 0x77));
        assert!(bytes[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_short_or_misdirected_buffer_is_io_error() {
        let store = store();
        let data = [1u8; 8];
        let mut buf = [0u8; 8];

        let short = execute(
            &store,
            Request::write(0).segment(Segment::payload(Some(PayloadBuf::Source(&data)), 16)),
        );
        assert!(matches!(
            short.error,
            Some(BlockError::InvalidSegment { index: 0, .. })
        ));

        let wrong_direction = execute(&store, Request::read(0).segment(Segment::source(&data)));
        assert_eq!(wrong_direction.status, Status::IoError);

        let wrong_direction = execute(&store, Request::write(0).segment(Segment::sink(&mut buf)));
        assert_eq!(wrong_direction.status, Status::IoError);

        let range = execute(&store, Request::write(0).segment(Segment::range(8)));
        assert_eq!(range.status, Status::IoError);

        assert!(contents(&store).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bounds_checked_before_buffer() {
        let store = store();
        let outcome = execute(
            &store,
            Request::write(8).segment(Segment::payload(None, 512)),
        );
        assert!(matches!(
            outcome.error,
            Some(BlockError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_longer_buffer_is_trimmed() {
        let store = store();
        let data = [0x42; 64];

        let outcome = execute(
            &store,
            Request::write(0).segment(Segment::payload(Some(PayloadBuf::Source(&data)), 32)),
        );
        assert!(outcome.is_ok());

        let bytes = contents(&store);
        assert!(bytes[..32].iter().all(|&b| b == 0x42));
        assert_eq!(bytes[32], 0);
    }

    #[test]
    fn test_gather_read() {
        let store = store();
        let pattern: Vec<u8> = (0..=255).collect();
        store.write_range(1024, &pattern).unwrap();

        let mut head = [0u8; 100];
        let mut tail = [0u8; 156];
        let outcome = execute(
            &store,
            Request::read(2)
                .segment(Segment::sink(&mut head))
                .segment(Segment::sink(&mut tail)),
        );
        assert!(outcome.is_ok());
        assert_eq!(&head[..], &pattern[..100]);
        assert_eq!(&tail[..], &pattern[100..]);
    }

    #[test]
    fn test_discard_whole_store() {
        let store = store();
        store.fill_range(0, 4096, 0xEE).unwrap();

        let outcome = execute(&store, Request::discard(0, 4096));
        assert!(outcome.is_ok());
        assert_eq!(outcome.bytes_transferred, 4096);
        assert!(contents(&store).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_fill_range() {
        let store = store();
        store.fill_range(0, 4096, 0xEE).unwrap();

        let outcome = execute(&store, Request::zero_fill(2, 1024));
        assert!(outcome.is_ok());

        let bytes = contents(&store);
        assert!(bytes[..1024].iter().all(|&b| b == 0xEE));
        assert!(bytes[1024..2048].iter().all(|&b| b == 0));
        assert!(bytes[2048..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_fill_zero_length_is_noop() {
        let store = store();
        store.fill_range(0, 4096, 0xEE).unwrap();

        // Even past the end: zero length returns before any bounds check
        assert!(execute(&store, Request::discard(100, 0)).is_ok());
        assert!(execute(&store, Request::zero_fill(0, 0)).is_ok());
        assert!(contents(&store).iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_fill_out_of_bounds_touches_nothing() {
        let store = store();
        store.fill_range(0, 4096, 0xEE).unwrap();

        let outcome = execute(&store, Request::discard(7, 1024));
        assert_eq!(outcome.status, Status::IoError);
        assert!(contents(&store).iter().all(|&b| b == 0xEE));

        let outcome = execute(&store, Request::zero_fill(u64::MAX, 1));
        assert_eq!(outcome.status, Status::IoError);
    }

    #[test]
    fn test_fill_ignores_payload_buffers() {
        let store = store();
        store.fill_range(0, 4096, 0xEE).unwrap();

        // No external-buffer validation on fill requests
        let outcome = execute(
            &store,
            Request::new(
                Operation::ZeroFill,
                0,
                vec![Segment::payload(None, 256), Segment::range(256)],
            ),
        );
        assert!(outcome.is_ok());

        let bytes = contents(&store);
        assert!(bytes[..512].iter().all(|&b| b == 0));
        assert!(bytes[512..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_unsupported_operation() {
        let store = store();
        store.fill_range(0, 4096, 0x3C).unwrap();
        let before = store.stats().snapshot();
        let data = [0u8; 512];

        for code in [2u16, 3, 5, 7, 0xFFFF] {
            let outcome = execute(
                &store,
                Request::new(Operation::from(code), 0, vec![Segment::source(&data)]),
            );
            assert_eq!(outcome.status, Status::Unsupported);
            assert_eq!(outcome.state(), RequestState::Rejected);
        }

        assert_eq!(store.stats().snapshot(), before);
        assert!(contents(&store).iter().all(|&b| b == 0x3C));
    }

    #[test]
    fn test_random_round_trip() {
        let store = Store::create(64 * 1024, 512).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let sector = rng.gen_range(0..128u64);
            let max_len = (128 - sector) * 512;
            let len = rng.gen_range(1..=max_len.min(4096)) as usize;
            let data: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();

            let outcome = execute(&store, Request::write(sector).segment(Segment::source(&data)));
            assert!(outcome.is_ok());

            let mut buf = vec![0u8; len];
            let outcome = execute(&store, Request::read(sector).segment(Segment::sink(&mut buf)));
            assert!(outcome.is_ok());
            assert_eq!(buf, data);
        }
    }

    #[test]
    fn test_concurrent_disjoint_writers() {
        let store = Arc::new(Store::create(64 * 1024, 512).unwrap());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8u8)
            .map(|worker| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let data = [worker + 1; 512];
                    for i in 0..16u64 {
                        let sector = u64::from(worker) * 16 + i;
                        let outcome =
                            execute(&store, Request::write(sector).segment(Segment::source(&data)));
                        assert!(outcome.is_ok());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let bytes = contents(&store);
        for worker in 0..8usize {
            let region = &bytes[worker * 16 * 512..(worker + 1) * 16 * 512];
            assert!(region.iter().all(|&b| b == worker as u8 + 1));
        }
    }

    #[test]
    fn test_concurrent_segments_are_individually_atomic() {
        // Each single-segment write is all-0x00 or all-0xFF; a reader must
        // never see a mix inside one segment, though it may across segments.
        let store = Arc::new(Store::create(4096, 512).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let writer = {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..2000u32 {
                    let value = if i % 2 == 0 { 0xFF } else { 0x00 };
                    let data = [value; 512];
                    let request = Request::write(0)
                        .segment(Segment::source(&data))
                        .segment(Segment::source(&data));
                    assert!(execute(&store, request).is_ok());
                }
            })
        };

        barrier.wait();
        for _ in 0..2000 {
            let mut first = [0u8; 512];
            let mut second = [0u8; 512];
            let request = Request::read(0)
                .segment(Segment::sink(&mut first))
                .segment(Segment::sink(&mut second));
            assert!(execute(&store, request).is_ok());

            assert!(first.iter().all(|&b| b == first[0]));
            assert!(second.iter().all(|&b| b == second[0]));
        }

        writer.join().unwrap();
    }

    #[test]
    fn test_concurrent_fill_is_atomic() {
        let store = Arc::new(Store::create(8192, 512).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let filler = {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..500 {
                    store.fill_range(0, 8192, 0xAB).unwrap();
                    assert!(execute(&store, Request::discard(0, 8192)).is_ok());
                }
            })
        };

        barrier.wait();
        for _ in 0..500 {
            let bytes = contents(&store);
            // One read sees the whole store either filled or discarded
            assert!(bytes.iter().all(|&b| b == bytes[0]));
        }

        filler.join().unwrap();
    }
}
