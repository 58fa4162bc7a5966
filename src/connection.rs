//! Per-connection protocol state machine.
//!
//! A session walks through `ReadingLength -> ReadingPayload -> Writing ->
//! Closing`. Short reads and writes are resumed until the frame is complete.
//! The session tally is merged into the histogram only once the full
//! 4-byte result has been written; every other exit discards it.
//!
//! Peer errors (reset, broken pipe, timeout) and premature closes abandon
//! the connection and are reported as an [`Outcome`]. Any other I/O error is
//! returned as a fatal [`ServerError`].

use crate::counter::Tally;
use crate::error::{is_recoverable, ServerError};
use crate::histogram::Histogram;
use crate::protocol::{decode_u32, encode_u32, FRAME_LEN};
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Payload read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the 4-byte payload length.
    ReadingLength {
        /// Length bytes received so far.
        received: usize,
    },
    /// Consuming the payload.
    ReadingPayload {
        /// Payload bytes received so far.
        received: u32,
        /// Declared payload length.
        total: u32,
    },
    /// Sending the 4-byte printable count.
    Writing {
        /// Result bytes already written.
        written: usize,
    },
    /// Exchange finished or abandoned.
    Closing,
}

/// Why a connection was abandoned without a result.
#[derive(Debug)]
pub enum DropReason {
    /// Peer closed its side before the exchange completed.
    PeerClosed,
    /// Recoverable TCP error (reset, broken pipe, timeout).
    PeerError(io::Error),
}

/// How a connection ended, when it did not end the process.
#[derive(Debug)]
pub enum Outcome {
    /// Result sent and tally merged into the histogram.
    Completed { count: u32 },
    /// Declared length was zero: closed without a result.
    EmptyPayload,
    /// Abandoned in `state`; the partial tally was discarded.
    Dropped { state: ConnState, reason: DropReason },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

/// Where the exchange stopped, before error classification.
enum Exchange {
    Completed,
    EmptyPayload,
    PeerClosed,
}

/// A single client exchange.
pub struct Session<S> {
    stream: S,
    state: ConnState,
    tally: Tally,
    buffer: BytesMut,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new session in the initial reading state.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            state: ConnState::ReadingLength { received: 0 },
            tally: Tally::new(),
            buffer: BytesMut::zeroed(BUFFER_SIZE),
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Tally of the payload consumed so far.
    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Drive the exchange. Recoverable errors come back as `Err` here and
    /// are classified by [`handle`].
    async fn exchange(&mut self) -> io::Result<Exchange> {
        let Some(total) = self.read_length().await? else {
            return Ok(Exchange::PeerClosed);
        };
        trace!(declared_len = total, "Received payload length");

        if total == 0 {
            self.state = ConnState::Closing;
            return Ok(Exchange::EmptyPayload);
        }

        if !self.read_payload(total).await? {
            return Ok(Exchange::PeerClosed);
        }

        if !self.write_count().await? {
            return Ok(Exchange::PeerClosed);
        }

        self.state = ConnState::Closing;
        Ok(Exchange::Completed)
    }

    /// Read the length frame. `None` if the peer closed first.
    async fn read_length(&mut self) -> io::Result<Option<u32>> {
        let mut frame = [0u8; FRAME_LEN];
        let mut received = 0;

        while received < FRAME_LEN {
            self.state = ConnState::ReadingLength { received };
            let n = read_some(&mut self.stream, &mut frame[received..]).await?;
            if n == 0 {
                return Ok(None);
            }
            received += n;
        }

        Ok(Some(decode_u32(frame)))
    }

    /// Consume exactly `total` payload bytes. Never reads past the declared
    /// length. Returns false if the peer closed early.
    async fn read_payload(&mut self, total: u32) -> io::Result<bool> {
        let mut received: u32 = 0;

        while received < total {
            self.state = ConnState::ReadingPayload { received, total };
            let want = ((total - received) as usize).min(self.buffer.len());
            let n = read_some(&mut self.stream, &mut self.buffer[..want]).await?;
            if n == 0 {
                return Ok(false);
            }
            self.tally.record(&self.buffer[..n]);
            // n <= want <= total - received, so this cannot overflow
            received += n as u32;
        }

        Ok(true)
    }

    /// Send the printable count. Returns false if the peer stopped accepting
    /// data before the whole frame was written.
    async fn write_count(&mut self) -> io::Result<bool> {
        let frame = encode_u32(self.tally.total());
        let mut written = 0;

        while written < FRAME_LEN {
            self.state = ConnState::Writing { written };
            match self.stream.write(&frame[written..]).await {
                Ok(0) => return Ok(false),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.stream.flush().await?;

        Ok(true)
    }
}

/// Read into `buf`, retrying on `Interrupted`.
async fn read_some<S>(stream: &mut S, buf: &mut [u8]) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    loop {
        match stream.read(buf).await {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

/// Handle one accepted connection end to end.
///
/// The stream is closed when this returns. On success the session tally is
/// merged into `histogram`; on any other path the histogram is untouched.
pub async fn handle<S>(stream: S, histogram: &mut Histogram) -> Result<Outcome, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(stream);

    let outcome = match session.exchange().await {
        Ok(Exchange::Completed) => {
            histogram.merge(&session.tally);
            Outcome::Completed {
                count: session.tally.total(),
            }
        }
        Ok(Exchange::EmptyPayload) => Outcome::EmptyPayload,
        Ok(Exchange::PeerClosed) => Outcome::Dropped {
            state: session.state,
            reason: DropReason::PeerClosed,
        },
        Err(e) if is_recoverable(&e) => Outcome::Dropped {
            state: session.state,
            reason: DropReason::PeerError(e),
        },
        Err(e) => {
            debug!(state = ?session.state, error = %e, "Fatal connection error");
            return Err(ServerError::ConnectionIo(e));
        }
    };

    drop(session);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn length(n: u32) -> [u8; 4] {
        encode_u32(n)
    }

    #[tokio::test]
    async fn test_completed_exchange() {
        let payload = b"Hello, World! 123";
        let stream = Builder::new()
            .read(&length(payload.len() as u32))
            .read(payload)
            .write(&encode_u32(17))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(outcome, Outcome::Completed { count: 17 }));
        assert_eq!(histogram.get(b'l'), 3);
        assert_eq!(histogram.stats().connections, 1);
    }

    #[tokio::test]
    async fn test_non_printable_not_counted() {
        let payload = b"abc\x07defghi";
        let stream = Builder::new()
            .read(&length(10))
            .read(payload)
            .write(&encode_u32(9))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(outcome, Outcome::Completed { count: 9 }));
        assert_eq!(histogram.get(0x07), 0);
        assert_eq!(histogram.stats().total_chars, 9);
    }

    #[tokio::test]
    async fn test_partial_reads_and_writes() {
        let stream = Builder::new()
            .read(&[0, 0])
            .read(&[0])
            .read(&[6])
            .read(b"ab")
            .read(b"\n")
            .read(b"cde")
            .write(&[0, 0])
            .write(&[0, 5])
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(outcome, Outcome::Completed { count: 5 }));
        assert_eq!(histogram.get(b'e'), 1);
    }

    #[tokio::test]
    async fn test_zero_length_sends_nothing() {
        let stream = Builder::new().read(&length(0)).build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(outcome, Outcome::EmptyPayload));
        assert_eq!(histogram, Histogram::new());
    }

    #[tokio::test]
    async fn test_close_before_length() {
        let stream = Builder::new().read(&[0, 0]).build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(
            outcome,
            Outcome::Dropped {
                state: ConnState::ReadingLength { received: 2 },
                reason: DropReason::PeerClosed,
            }
        ));
        assert_eq!(histogram, Histogram::new());
    }

    #[tokio::test]
    async fn test_close_mid_payload_discards_tally() {
        let stream = Builder::new().read(&length(10)).read(b"abcd").build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(
            outcome,
            Outcome::Dropped {
                state: ConnState::ReadingPayload {
                    received: 4,
                    total: 10
                },
                reason: DropReason::PeerClosed,
            }
        ));
        assert_eq!(histogram.get(b'a'), 0);
    }

    #[tokio::test]
    async fn test_reset_during_payload_is_recoverable() {
        let stream = Builder::new()
            .read(&length(8))
            .read(b"abc")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        match outcome {
            Outcome::Dropped {
                reason: DropReason::PeerError(e),
                ..
            } => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("Expected peer error, got {other:?}"),
        }
        assert_eq!(histogram, Histogram::new());
    }

    #[tokio::test]
    async fn test_timeout_reading_length_is_recoverable() {
        let stream = Builder::new()
            .read(&[0])
            .read_error(io::Error::from(io::ErrorKind::TimedOut))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(!outcome.is_completed());
        assert!(matches!(
            outcome,
            Outcome::Dropped {
                reason: DropReason::PeerError(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_broken_pipe_on_write_skips_merge() {
        let stream = Builder::new()
            .read(&length(3))
            .read(b"xyz")
            .write_error(io::Error::from(io::ErrorKind::BrokenPipe))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(
            outcome,
            Outcome::Dropped {
                state: ConnState::Writing { written: 0 },
                reason: DropReason::PeerError(_),
            }
        ));
        assert_eq!(histogram.get(b'x'), 0);
        assert_eq!(histogram.stats().connections, 0);
    }

    #[tokio::test]
    async fn test_other_read_error_is_fatal() {
        let stream = Builder::new()
            .read(&length(4))
            .read_error(io::Error::from(io::ErrorKind::PermissionDenied))
            .build();

        let mut histogram = Histogram::new();
        let err = handle(stream, &mut histogram).await.unwrap_err();

        assert!(matches!(err, ServerError::ConnectionIo(_)));
        assert_eq!(histogram, Histogram::new());
    }

    #[tokio::test]
    async fn test_interrupted_read_is_retried() {
        let stream = Builder::new()
            .read(&length(2))
            .read_error(io::Error::from(io::ErrorKind::Interrupted))
            .read(b"ok")
            .write(&encode_u32(2))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(matches!(outcome, Outcome::Completed { count: 2 }));
    }

    #[tokio::test]
    async fn test_large_payload_spans_buffers() {
        let payload: Vec<u8> = (0u8..=255).cycle().take(BUFFER_SIZE * 2 + 100).collect();
        let expected = Tally::count(&payload);
        let stream = Builder::new()
            .read(&length(payload.len() as u32))
            .read(&payload)
            .write(&encode_u32(expected.total()))
            .build();

        let mut histogram = Histogram::new();
        let outcome = handle(stream, &mut histogram).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(histogram.get(b'A'), expected.get(b'A'));
    }

    #[test]
    fn test_session_initial_state() {
        let session = Session::new(Builder::new().build());
        assert_eq!(session.state(), ConnState::ReadingLength { received: 0 });
        assert!(session.tally().is_empty());
    }
}
