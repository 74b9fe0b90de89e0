//! Full-duplex connection built from a pair of pipes.
//!
//! [`duplex`] allocates two independent pipes and wires them into two
//! [`Endpoint`]s: each endpoint reads from one pipe and writes to the other,
//! like an in-process `socketpair`. Deadlines are per endpoint and per
//! direction; closing an endpoint closes both underlying pipes.

use std::fmt;
use std::io;

use minstant::Instant;

use crate::cancel::CancelToken;
use crate::error::PipeError;
use crate::pipe::{Mode, PipeReader, PipeWriter, channel};

/// Opaque address label for pipe connections. There is no real network
/// address; both ends of every connection display as `"pipe"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeAddr;

impl PipeAddr {
    /// The pseudo network this address belongs to.
    #[must_use]
    pub const fn network(&self) -> &'static str {
        "pipe"
    }
}

impl fmt::Display for PipeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pipe")
    }
}

/// One side of a full-duplex in-process byte connection.
///
/// Owns a [`PipeReader`] on the inbound pipe and a [`PipeWriter`] on the
/// outbound pipe. Like the halves it is [`Send`] but not [`Sync`]; use
/// [`into_split`](Self::into_split) to drive the two directions from
/// different threads.
pub struct Endpoint {
    reader: PipeReader,
    writer: PipeWriter,
}

/// Creates a connected pair of endpoints over two pipes of `capacity` bytes
/// each (rounded as in [`channel`]).
#[must_use]
pub fn duplex(capacity: usize, mode: Mode) -> (Endpoint, Endpoint) {
    let (r1, w1) = channel(capacity, mode);
    let (r2, w2) = channel(capacity, mode);
    (
        Endpoint {
            reader: r1,
            writer: w2,
        },
        Endpoint {
            reader: r2,
            writer: w1,
        },
    )
}

impl Endpoint {
    /// Fills all of `buf` from the peer. See [`PipeReader::read`].
    ///
    /// # Errors
    ///
    /// As [`PipeReader::read`].
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, PipeError> {
        self.reader.read(buf)
    }

    /// Like [`read`](Self::read), interruptible by `cancel`.
    ///
    /// # Errors
    ///
    /// As [`PipeReader::read_with_cancel`].
    pub fn read_with_cancel(
        &mut self,
        buf: &mut [u8],
        cancel: &CancelToken,
    ) -> Result<usize, PipeError> {
        self.reader.read_with_cancel(buf, cancel)
    }

    /// Writes all of `buf` to the peer. See [`PipeWriter::write`].
    ///
    /// # Errors
    ///
    /// As [`PipeWriter::write`].
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, PipeError> {
        self.writer.write(buf)
    }

    /// Like [`write`](Self::write), interruptible by `cancel`.
    ///
    /// # Errors
    ///
    /// As [`PipeWriter::write_with_cancel`].
    pub fn write_with_cancel(
        &mut self,
        buf: &[u8],
        cancel: &CancelToken,
    ) -> Result<usize, PipeError> {
        self.writer.write_with_cancel(buf, cancel)
    }

    /// Bytes buffered inbound and available for immediate read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.reader.pending()
    }

    /// Whether either direction has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.is_closed() || self.writer.is_closed()
    }

    /// Sets the deadline for blocking reads on this endpoint.
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.reader.set_deadline(deadline);
    }

    /// Sets the deadline for blocking writes on this endpoint.
    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.writer.set_deadline(deadline);
    }

    /// Sets the same deadline for both directions.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    /// Closes both underlying pipes, waking all blockers on both endpoints.
    /// Idempotent. The peer still drains bytes buffered before the close.
    pub fn close(&self) {
        self.reader.close();
        self.writer.close();
    }

    /// The local address label.
    #[must_use]
    pub fn local_addr(&self) -> PipeAddr {
        PipeAddr
    }

    /// The peer address label.
    #[must_use]
    pub fn peer_addr(&self) -> PipeAddr {
        PipeAddr
    }

    /// Splits the endpoint into its halves so the two directions can run on
    /// different threads.
    #[must_use]
    pub fn into_split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }
}

impl io::Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.reader, buf)
    }
}

impl io::Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.writer, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.writer)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_opaque_pipe_labels() {
        let (a, b) = duplex(32, Mode::Spsc);
        assert_eq!(a.local_addr().to_string(), "pipe");
        assert_eq!(b.peer_addr().to_string(), "pipe");
        assert_eq!(a.local_addr().network(), "pipe");
    }

    #[test]
    fn endpoints_exchange_bytes_both_ways() {
        let (mut a, mut b) = duplex(32, Mode::Spsc);

        a.write(b"ping").unwrap();
        let mut buf = [0u8; 4];
        b.read(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        b.write(b"pong").unwrap();
        a.read(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn close_reaches_both_pipes() {
        let (a, mut b) = duplex(32, Mode::Spsc);
        a.close();
        assert!(b.is_closed());

        let mut buf = [0u8; 1];
        assert_eq!(
            b.read(&mut buf).unwrap_err(),
            PipeError::Closed { done: 0 }
        );
        assert_eq!(b.write(&[1]).unwrap_err(), PipeError::Closed { done: 0 });
    }

    #[test]
    fn dropping_an_endpoint_closes_the_peer() {
        let (a, mut b) = duplex(32, Mode::Spsc);
        drop(a);
        let mut buf = [0u8; 1];
        assert_eq!(
            b.read(&mut buf).unwrap_err(),
            PipeError::Closed { done: 0 }
        );
    }
}
