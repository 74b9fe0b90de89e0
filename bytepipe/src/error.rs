//! Typed errors for pipe operations.
//!
//! Every blocking transfer reports partial progress: an operation that moved
//! ten bytes before the cancel token fired fails with
//! `Canceled { done: 10 }`. Nothing is retried internally and no byte is
//! silently dropped; the caller decides whether to resume.

use std::io;

use thiserror::Error;

/// Why a pipe operation stopped early.
///
/// [`TimedOut`](PipeError::TimedOut) and [`Canceled`](PipeError::Canceled)
/// are transient: the pipe is immediately reusable afterwards.
/// [`Closed`](PipeError::Closed) is terminal by construction — the closed
/// bit is sticky and nothing ever clears it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    /// The pipe was closed. `done` bytes were transferred before the close
    /// was observed; on the reader side this is the end-of-stream marker and
    /// `done` may carry the final partial chunk.
    #[error("pipe closed after {done} bytes")]
    Closed { done: usize },

    /// The deadline expired while blocked. `done` bytes were transferred
    /// before the expiry.
    #[error("i/o timeout after {done} bytes")]
    TimedOut { done: usize },

    /// The cancel token fired while blocked. `done` bytes were transferred
    /// before the cancellation.
    #[error("operation canceled after {done} bytes")]
    Canceled { done: usize },

    /// A wait asked for more bytes than the pipe can ever hold. Returned
    /// without blocking: no sequence of reads or writes can make room.
    #[error("minimum {min} bytes exceeds pipe capacity {cap}")]
    Overcap { min: usize, cap: usize },
}

impl PipeError {
    /// Bytes transferred before the operation stopped.
    #[must_use]
    pub const fn done(&self) -> usize {
        match self {
            Self::Closed { done } | Self::TimedOut { done } | Self::Canceled { done } => *done,
            Self::Overcap { .. } => 0,
        }
    }

    /// Whether this is the terminal close/end-of-stream error.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

impl From<PipeError> for io::Error {
    fn from(e: PipeError) -> Self {
        let kind = match e {
            PipeError::Closed { .. } => io::ErrorKind::BrokenPipe,
            PipeError::TimedOut { .. } => io::ErrorKind::TimedOut,
            PipeError::Canceled { .. } => io::ErrorKind::Interrupted,
            PipeError::Overcap { .. } => io::ErrorKind::InvalidInput,
        };
        Self::new(kind, e)
    }
}

/// Error from the streaming adapters ([`PipeReader::write_to`] and
/// [`PipeWriter::read_from`]): the transfer stopped after `done` bytes.
///
/// `source` is the collaborator's [`io::Error`], or a converted
/// [`PipeError`] when the pipe side failed.
///
/// [`PipeReader::write_to`]: crate::PipeReader::write_to
/// [`PipeWriter::read_from`]: crate::PipeWriter::read_from
#[derive(Debug, Error)]
#[error("transfer stopped after {done} bytes")]
pub struct CopyError {
    /// Bytes fully moved through the pipe before the failure.
    pub done: u64,
    /// What stopped the transfer.
    #[source]
    pub source: io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_progress_is_carried() {
        assert_eq!(PipeError::Canceled { done: 10 }.done(), 10);
        assert_eq!(PipeError::Closed { done: 3 }.done(), 3);
        assert_eq!(PipeError::Overcap { min: 9, cap: 8 }.done(), 0);
    }

    #[test]
    fn io_error_kinds() {
        let e: io::Error = PipeError::Closed { done: 0 }.into();
        assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);

        let e: io::Error = PipeError::TimedOut { done: 1 }.into();
        assert_eq!(e.kind(), io::ErrorKind::TimedOut);

        let e: io::Error = PipeError::Overcap { min: 99, cap: 8 }.into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn io_error_preserves_typed_source() {
        let e: io::Error = PipeError::Canceled { done: 7 }.into();
        let inner = e
            .get_ref()
            .and_then(|s| s.downcast_ref::<PipeError>())
            .expect("typed source");
        assert_eq!(*inner, PipeError::Canceled { done: 7 });
    }
}
