//! Scatter/gather request model
//!
//! A request is built by the caller, consumed exactly once by
//! [`execute`](crate::executor::execute), and produces exactly one
//! [`Outcome`].

use crate::error::BlockError;

use std::fmt;

// Wire codes, shared with the NBD command set
const CMD_READ: u16 = 0;
const CMD_WRITE: u16 = 1;
const CMD_TRIM: u16 = 4;
const CMD_WRITE_ZEROES: u16 = 6;

/// Request operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Copy from the store into payload segments
    Read,
    /// Copy from payload segments into the store
    Write,
    /// Logically clear a range
    Discard,
    /// Zero a range
    ZeroFill,
    /// Any other command code; never serviced
    Other(u16),
}

impl Operation {
    /// Whether this operation is a whole-range fill with no payload
    pub fn is_fill(&self) -> bool {
        matches!(self, Operation::Discard | Operation::ZeroFill)
    }

    /// Whether this operation moves payload data
    pub fn is_transfer(&self) -> bool {
        matches!(self, Operation::Read | Operation::Write)
    }
}

impl From<u16> for Operation {
    fn from(code: u16) -> Self {
        match code {
            CMD_READ => Operation::Read,
            CMD_WRITE => Operation::Write,
            CMD_TRIM => Operation::Discard,
            CMD_WRITE_ZEROES => Operation::ZeroFill,
            other => Operation::Other(other),
        }
    }
}

impl From<Operation> for u16 {
    fn from(op: Operation) -> u16 {
        match op {
            Operation::Read => CMD_READ,
            Operation::Write => CMD_WRITE,
            Operation::Discard => CMD_TRIM,
            Operation::ZeroFill => CMD_WRITE_ZEROES,
            Operation::Other(code) => code,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
            Operation::Discard => f.write_str("discard"),
            Operation::ZeroFill => f.write_str("zero-fill"),
            Operation::Other(code) => write!(f, "command {code}"),
        }
    }
}

/// External buffer carried by a payload segment
#[derive(Debug)]
pub enum PayloadBuf<'a> {
    /// Data to be written into the store
    Source(&'a [u8]),
    /// Destination for data read from the store
    Sink(&'a mut [u8]),
}

impl PayloadBuf<'_> {
    /// Length of the external buffer
    pub fn len(&self) -> usize {
        match self {
            PayloadBuf::Source(data) => data.len(),
            PayloadBuf::Sink(buf) => buf.len(),
        }
    }

    /// Check if the external buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One contiguous chunk of a request
#[derive(Debug)]
pub enum Segment<'a> {
    /// Segment backed by an external buffer of at least `length` bytes
    Payload {
        buffer: Option<PayloadBuf<'a>>,
        length: u64,
    },
    /// Pure range with no external buffer (discard / zero-fill)
    Range { length: u64 },
}

impl<'a> Segment<'a> {
    /// Payload segment writing all of `data`
    pub fn source(data: &'a [u8]) -> Self {
        Segment::Payload {
            length: data.len() as u64,
            buffer: Some(PayloadBuf::Source(data)),
        }
    }

    /// Payload segment reading into all of `buf`
    pub fn sink(buf: &'a mut [u8]) -> Self {
        Segment::Payload {
            length: buf.len() as u64,
            buffer: Some(PayloadBuf::Sink(buf)),
        }
    }

    /// Payload segment with an explicit length
    ///
    /// The executor rejects the segment if `buffer` is `None` or shorter
    /// than `length`.
    pub fn payload(buffer: Option<PayloadBuf<'a>>, length: u64) -> Self {
        Segment::Payload { buffer, length }
    }

    /// Range segment of `length` bytes
    pub fn range(length: u64) -> Self {
        Segment::Range { length }
    }

    /// Number of device bytes this segment covers
    pub fn length(&self) -> u64 {
        match self {
            Segment::Payload { length, .. } | Segment::Range { length } => *length,
        }
    }
}

/// A scatter/gather I/O request
#[derive(Debug)]
pub struct Request<'a> {
    operation: Operation,
    start_sector: u64,
    segments: Vec<Segment<'a>>,
}

impl<'a> Request<'a> {
    /// Create a request from its parts
    pub fn new(operation: Operation, start_sector: u64, segments: Vec<Segment<'a>>) -> Self {
        Self {
            operation,
            start_sector,
            segments,
        }
    }

    /// Empty read request; add segments with [`Request::segment`]
    pub fn read(start_sector: u64) -> Self {
        Self::new(Operation::Read, start_sector, Vec::new())
    }

    /// Empty write request; add segments with [`Request::segment`]
    pub fn write(start_sector: u64) -> Self {
        Self::new(Operation::Write, start_sector, Vec::new())
    }

    /// Discard `length` bytes starting at `start_sector`
    pub fn discard(start_sector: u64, length: u64) -> Self {
        Self::new(
            Operation::Discard,
            start_sector,
            vec![Segment::range(length)],
        )
    }

    /// Zero `length` bytes starting at `start_sector`
    pub fn zero_fill(start_sector: u64, length: u64) -> Self {
        Self::new(
            Operation::ZeroFill,
            start_sector,
            vec![Segment::range(length)],
        )
    }

    /// Append a segment
    #[must_use]
    pub fn segment(mut self, segment: Segment<'a>) -> Self {
        self.segments.push(segment);
        self
    }

    /// Get the operation
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Get the starting sector
    pub fn start_sector(&self) -> u64 {
        self.start_sector
    }

    /// Get the segments
    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    /// Split the request into its segments
    pub fn into_segments(self) -> Vec<Segment<'a>> {
        self.segments
    }

    /// Total device bytes covered by the request
    ///
    /// Returns `None` if the sum overflows.
    pub fn total_length(&self) -> Option<u64> {
        self.segments
            .iter()
            .try_fold(0u64, |acc, seg| acc.checked_add(seg.length()))
    }

    /// Device byte offset of segment `index`
    ///
    /// `start_sector * sector_size` plus the lengths of all earlier
    /// segments. Returns `None` if `index` is out of range or the offset
    /// overflows.
    pub fn device_offset(&self, index: usize, sector_size: u32) -> Option<u64> {
        if index >= self.segments.len() {
            return None;
        }
        let start = self.start_sector.checked_mul(u64::from(sector_size))?;
        self.segments[..index]
            .iter()
            .try_fold(start, |acc, seg| acc.checked_add(seg.length()))
    }
}

/// Terminal status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    IoError,
    Unsupported,
}

/// Request lifecycle state
///
/// `Pending → InProgress → {Completed, Failed, Rejected}`; terminal states
/// are final and a request is never retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Rejected,
}

impl RequestState {
    /// Check if the state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Rejected
        )
    }

    /// Move to `next` if the lifecycle allows it
    ///
    /// `InProgress` is only reachable from `Pending`, and terminal states
    /// are only reachable from `InProgress`. Returns `None` otherwise.
    pub fn advance(self, next: RequestState) -> Option<RequestState> {
        match (self, next) {
            (RequestState::Pending, RequestState::InProgress) => Some(next),
            (RequestState::InProgress, next) if next.is_terminal() => Some(next),
            _ => None,
        }
    }
}

impl From<Status> for RequestState {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => RequestState::Completed,
            Status::IoError => RequestState::Failed,
            Status::Unsupported => RequestState::Rejected,
        }
    }
}

/// Result of executing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Terminal status
    pub status: Status,
    /// Payload or fill bytes applied before the request finished
    pub bytes_transferred: u64,
    /// Segments consumed without error (zero-length segments included)
    pub segments_completed: usize,
    /// Cause of a non-Ok status
    pub error: Option<BlockError>,
}

impl Outcome {
    /// Successful outcome
    pub fn ok(bytes_transferred: u64, segments_completed: usize) -> Self {
        Self {
            status: Status::Ok,
            bytes_transferred,
            segments_completed,
            error: None,
        }
    }

    /// I/O error outcome; earlier segments keep their effects
    pub fn io_error(error: BlockError, bytes_transferred: u64, segments_completed: usize) -> Self {
        Self {
            status: Status::IoError,
            bytes_transferred,
            segments_completed,
            error: Some(error),
        }
    }

    /// Outcome for an operation kind the executor does not service
    pub fn unsupported(operation: Operation) -> Self {
        Self {
            status: Status::Unsupported,
            bytes_transferred: 0,
            segments_completed: 0,
            error: Some(BlockError::Unsupported(operation.to_string())),
        }
    }

    /// Check if the request completed successfully
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Terminal request state
    pub fn state(&self) -> RequestState {
        self.status.into()
    }

    /// errno to report to the completion consumer (0 on success)
    pub fn errno(&self) -> i32 {
        use memblk_common::error::errno;

        match (&self.status, &self.error) {
            (Status::Ok, _) => 0,
            (_, Some(err)) => memblk_common::Error::from(err.clone()).errno(),
            (Status::IoError, None) => errno::EIO,
            (Status::Unsupported, None) => errno::EOPNOTSUPP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_codes() {
        assert_eq!(Operation::from(0), Operation::Read);
        assert_eq!(Operation::from(1), Operation::Write);
        assert_eq!(Operation::from(4), Operation::Discard);
        assert_eq!(Operation::from(6), Operation::ZeroFill);
        assert_eq!(Operation::from(3), Operation::Other(3));
        assert_eq!(u16::from(Operation::ZeroFill), 6);
        assert_eq!(u16::from(Operation::Other(42)), 42);

        assert!(Operation::Discard.is_fill());
        assert!(!Operation::Write.is_fill());
        assert!(Operation::Read.is_transfer());
        assert!(!Operation::Other(3).is_transfer());
    }

    #[test]
    fn test_segment_lengths() {
        let data = [1u8; 100];
        let mut buf = [0u8; 40];

        assert_eq!(Segment::source(&data).length(), 100);
        assert_eq!(Segment::sink(&mut buf).length(), 40);
        assert_eq!(Segment::range(512).length(), 512);
        assert_eq!(Segment::payload(None, 7).length(), 7);
    }

    #[test]
    fn test_device_offset() {
        let a = [0u8; 100];
        let b = [0u8; 4000];
        let request = Request::write(2)
            .segment(Segment::source(&a))
            .segment(Segment::range(0))
            .segment(Segment::source(&b));

        assert_eq!(request.device_offset(0, 512), Some(1024));
        assert_eq!(request.device_offset(1, 512), Some(1124));
        assert_eq!(request.device_offset(2, 512), Some(1124));
        assert_eq!(request.device_offset(3, 512), None);
        assert_eq!(request.total_length(), Some(4100));
    }

    #[test]
    fn test_device_offset_overflow() {
        let request = Request::discard(u64::MAX, 1);
        assert_eq!(request.device_offset(0, 512), None);

        let request = Request::new(
            Operation::Discard,
            0,
            vec![Segment::range(u64::MAX), Segment::range(1)],
        );
        assert_eq!(request.total_length(), None);
    }

    #[test]
    fn test_fill_constructors() {
        let request = Request::discard(3, 1024);
        assert_eq!(request.operation(), Operation::Discard);
        assert_eq!(request.start_sector(), 3);
        assert_eq!(request.total_length(), Some(1024));
        assert!(matches!(request.segments(), [Segment::Range { length: 1024 }]));
    }

    #[test]
    fn test_outcome_states() {
        assert_eq!(Outcome::ok(512, 1).state(), RequestState::Completed);
        assert_eq!(Outcome::ok(512, 1).errno(), 0);

        let failed = Outcome::io_error(
            BlockError::OutOfBounds {
                offset: 3584,
                length: 1024,
                capacity: 4096,
            },
            0,
            0,
        );
        assert_eq!(failed.state(), RequestState::Failed);
        assert_eq!(failed.errno(), 5);

        let rejected = Outcome::unsupported(Operation::Other(3));
        assert_eq!(rejected.state(), RequestState::Rejected);
        assert_eq!(rejected.errno(), 95);

        assert!(RequestState::Failed.is_terminal());
        assert!(!RequestState::InProgress.is_terminal());
    }

    #[test]
    fn test_request_state_lifecycle() {
        let state = RequestState::Pending;
        let state = state.advance(RequestState::InProgress).unwrap();
        assert_eq!(state, RequestState::InProgress);
        assert_eq!(
            state.advance(RequestState::Failed),
            Some(RequestState::Failed)
        );

        // InProgress is entered once; terminal states are final
        assert_eq!(state.advance(RequestState::InProgress), None);
        assert_eq!(RequestState::Pending.advance(RequestState::Completed), None);
        assert_eq!(RequestState::Completed.advance(RequestState::InProgress), None);
        assert_eq!(RequestState::Rejected.advance(RequestState::Completed), None);
    }
}
