//! Bounded, lock-light, in-process byte pipe.
//!
//! A pipe is a power-of-two ring buffer whose entire state — close flag,
//! read offset, and buffered-byte count — lives in a single atomic word, so
//! every load is a complete, untorn snapshot. The [`PipeReader`] and
//! [`PipeWriter`] halves share the ring; blocked parties park on one-slot
//! edge-triggered signals and are woken by the opposite side, a per-handle
//! deadline, or a [`CancelToken`].
//!
//! # Overview
//!
//! - [`channel`] / [`with_buffer`] — build a pipe, get the
//!   `(PipeReader, PipeWriter)` pair
//! - [`duplex`] — two pipes wired into a pair of full-duplex [`Endpoint`]s
//! - [`Mode`] — SPSC, or serialized multi-handle sides
//! - Every partial-progress operation reports its byte count in the error:
//!   a write canceled after 10 bytes fails with
//!   [`Canceled { done: 10 }`](PipeError::Canceled)
//!
//! # Example
//!
//! ```
//! use bytepipe::{Mode, channel};
//!
//! let (mut rx, mut tx) = channel(16, Mode::Spsc);
//!
//! let writer = std::thread::spawn(move || {
//!     tx.write(b"across threads").unwrap();
//! });
//!
//! let mut buf = [0u8; 14];
//! rx.read(&mut buf).unwrap();
//! assert_eq!(&buf, b"across threads");
//! writer.join().unwrap();
//! ```

pub mod cancel;
pub mod conn;
pub mod error;
pub mod pipe;
pub mod trace;

pub use cancel::CancelToken;
pub use conn::{Endpoint, PipeAddr, duplex};
pub use error::{CopyError, PipeError};
pub use pipe::{
    DEFAULT_CAPACITY, MAX_CAPACITY, MIN_CAPACITY, Mode, PipeReader, PipeWriter, channel,
    with_buffer,
};
