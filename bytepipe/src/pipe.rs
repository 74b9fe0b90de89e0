//! The bounded in-process byte pipe.
//!
//! A pipe is a power-of-two ring buffer whose entire state — close flag,
//! read offset, and buffered-byte count — is packed into a single atomic
//! word. The [`PipeReader`] and [`PipeWriter`] halves share the ring by
//! reference; blocked parties park on one-slot notification signals and are
//! woken by the opposite side, a deadline, or a cancel token.
//!
//! # Overview
//!
//! - [`channel`] — build a pipe, get the `(PipeReader, PipeWriter)` pair
//! - [`with_buffer`] — same, over a caller-provided buffer
//! - [`Mode`] — whether handles on a side may be cloned and are serialized
//! - Lock-light: the SPSC hot path is a load, a copy, and one atomic RMW
//!
//! # Example
//!
//! ```
//! use bytepipe::{Mode, channel};
//!
//! let (mut rx, mut tx) = channel(64, Mode::Spsc);
//!
//! tx.write(b"hello").unwrap();
//!
//! let mut buf = [0u8; 5];
//! rx.read(&mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use minstant::Instant;

use crate::error::PipeError;
use crate::trace::debug;

pub(crate) mod lock;
pub(crate) mod signal;
pub(crate) mod state;
pub(crate) mod storage;

mod reader;
mod writer;

pub use reader::PipeReader;
pub use writer::PipeWriter;

use lock::SideLock;
use signal::Signal;
use state::{Snapshot, State};
use storage::Storage;

/// Capacity used when [`channel`] is called with `0`.
pub const DEFAULT_CAPACITY: usize = 32 * 1024;

/// Smallest capacity a pipe is ever built with.
pub const MIN_CAPACITY: usize = 8;

/// Largest supported capacity. The buffered-byte count must represent the
/// value `cap` itself in a 31-bit field with the reserved bit kept zero, so
/// the ceiling is 2^30.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Scratch size for the streaming adapters
/// ([`PipeReader::write_to`], [`PipeWriter::read_from`]).
pub(crate) const COPY_CHUNK: usize = 8 * 1024;

/// Marker type to opt-out of `Sync` while remaining `Send`.
pub(crate) type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Concurrency mode, chosen at construction and immutable thereafter.
///
/// The mode decides which sides may have more than one handle
/// (via [`PipeReader::clone_handle`] / [`PipeWriter::clone_handle`]) and
/// are therefore serialized by an internal cooperative lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single producer, single consumer. No internal serialization; neither
    /// handle can be cloned.
    Spsc,
    /// Any number of writer handles, serialized by a writer lock. Still a
    /// single reader handle.
    SyncWriters,
    /// Both sides may have multiple handles, each side serialized by its own
    /// lock.
    SyncBoth,
}

impl Mode {
    pub(crate) const fn synchronized_writers(self) -> bool {
        matches!(self, Self::SyncWriters | Self::SyncBoth)
    }

    pub(crate) const fn synchronized_readers(self) -> bool {
        matches!(self, Self::SyncBoth)
    }
}

/// Creates a pipe with (at least) the requested capacity.
///
/// `capacity` is rounded up to the next power of two with a floor of
/// [`MIN_CAPACITY`]; `0` selects [`DEFAULT_CAPACITY`].
///
/// # Panics
///
/// Panics if the rounded capacity would exceed [`MAX_CAPACITY`].
#[must_use]
pub fn channel(capacity: usize, mode: Mode) -> (PipeReader, PipeWriter) {
    build(Storage::new(round_capacity(capacity)), mode)
}

/// Creates a pipe over a caller-provided buffer (for example one carved from
/// an arena). The buffer's current contents are irrelevant; the pipe starts
/// empty.
///
/// # Panics
///
/// Panics if `buf.len()` is not a power of two in
/// `[MIN_CAPACITY, MAX_CAPACITY]`.
#[must_use]
pub fn with_buffer(buf: Vec<u8>, mode: Mode) -> (PipeReader, PipeWriter) {
    let cap = buf.len();
    assert!(
        cap.is_power_of_two() && (MIN_CAPACITY..=MAX_CAPACITY).contains(&cap),
        "buffer length {cap} must be a power of two in [{MIN_CAPACITY}, {MAX_CAPACITY}]"
    );
    build(Storage::from_vec(buf), mode)
}

fn round_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        return DEFAULT_CAPACITY;
    }
    let capacity = capacity.max(MIN_CAPACITY);
    assert!(
        capacity <= MAX_CAPACITY,
        "pipe capacity {capacity} exceeds the maximum of {MAX_CAPACITY}"
    );
    capacity.next_power_of_two()
}

fn build(storage: Storage, mode: Mode) -> (PipeReader, PipeWriter) {
    let cap = storage.len();
    let shared = Arc::new(Shared {
        state: State::new(cap),
        storage,
        data_ready: Signal::new(),
        space_ready: Signal::new(),
        reader_lock: mode.synchronized_readers().then(SideLock::new),
        writer_lock: mode.synchronized_writers().then(SideLock::new),
        readers: AtomicUsize::new(1),
        writers: AtomicUsize::new(1),
        mode,
    });
    (
        PipeReader::new(Arc::clone(&shared)),
        PipeWriter::new(shared),
    )
}

/// Returns `TimedOut` up front when the deadline has already passed: an
/// expired deadline fails before performing any work.
pub(crate) fn check_deadline(deadline: Option<Instant>) -> Result<(), PipeError> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(PipeError::TimedOut { done: 0 }),
        _ => Ok(()),
    }
}

/// State shared by all handles of one pipe.
pub(crate) struct Shared {
    pub(crate) state: State,
    pub(crate) storage: Storage,
    /// Raised by writers after publishing bytes; readers park on it.
    pub(crate) data_ready: Signal,
    /// Raised by the reader after freeing space; writers park on it.
    pub(crate) space_ready: Signal,
    /// Present in [`Mode::SyncBoth`].
    pub(crate) reader_lock: Option<SideLock>,
    /// Present in [`Mode::SyncWriters`] and [`Mode::SyncBoth`].
    pub(crate) writer_lock: Option<SideLock>,
    /// Live reader handles; the last one to drop closes the pipe.
    pub(crate) readers: AtomicUsize,
    /// Live writer handles; the last one to drop closes the pipe.
    pub(crate) writers: AtomicUsize,
    pub(crate) mode: Mode,
}

impl Shared {
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Sets the sticky close flag and wakes every blocker: parked readers,
    /// parked writers, and lock waiters on both sides. Idempotent.
    pub(crate) fn close(&self) {
        if self.state.close() {
            debug!(capacity = self.capacity(), "pipe closed");
            self.data_ready.raise();
            self.space_ready.raise();
            if let Some(lock) = &self.reader_lock {
                lock.wake_waiters();
            }
            if let Some(lock) = &self.writer_lock {
                lock.wake_waiters();
            }
        }
    }

    /// One drain attempt: copies up to `dst.len()` buffered bytes, commits
    /// the consumption, and raises `space_ready`. Returns `0` when the pipe
    /// is empty. Caller is the unique (or lock-holding) reader.
    pub(crate) fn pop_slice(&self, dst: &mut [u8]) -> usize {
        let snap = self.state.load();
        let n = snap.readable().min(dst.len());
        if n == 0 {
            return 0;
        }
        self.storage.copy_out(snap.head(), &mut dst[..n]);
        self.state.commit_read(n);
        self.space_ready.raise();
        n
    }

    /// One fill attempt: copies up to `src.len()` bytes into free space,
    /// publishes them, and raises `data_ready`. Returns `0` when the pipe is
    /// full. Caller is the unique (or lock-holding) writer.
    pub(crate) fn push_slice(&self, src: &[u8]) -> usize {
        let snap = self.state.load();
        let n = (self.capacity() - snap.readable()).min(src.len());
        if n == 0 {
            return 0;
        }
        self.storage.copy_in(self.write_pos(snap), &src[..n]);
        self.state.publish_write(n);
        self.data_ready.raise();
        n
    }

    /// Discards up to `max` buffered bytes without copying them out.
    /// Returns the number discarded.
    pub(crate) fn skip_slice(&self, max: usize) -> usize {
        let snap = self.state.load();
        let n = snap.readable().min(max);
        if n == 0 {
            return 0;
        }
        self.state.commit_read(n);
        self.space_ready.raise();
        n
    }

    /// All-or-nothing drain of exactly `dst.len()` bytes in one state
    /// transition. Returns `false` without consuming anything when fewer
    /// bytes are buffered.
    pub(crate) fn try_pop_exact(&self, dst: &mut [u8]) -> bool {
        let snap = self.state.load();
        if snap.readable() < dst.len() {
            return false;
        }
        self.storage.copy_out(snap.head(), dst);
        self.state.commit_read(dst.len());
        self.space_ready.raise();
        true
    }

    /// All-or-nothing publish of exactly `src.len()` bytes in one state
    /// transition. Returns `false` without writing anything when the free
    /// space is insufficient.
    pub(crate) fn try_push_exact(&self, src: &[u8]) -> bool {
        let snap = self.state.load();
        if self.capacity() - snap.readable() < src.len() {
            return false;
        }
        self.storage.copy_in(self.write_pos(snap), src);
        self.state.publish_write(src.len());
        self.data_ready.raise();
        true
    }

    #[inline]
    fn write_pos(&self, snap: Snapshot) -> usize {
        (snap.head() + snap.readable()) & self.storage.mask()
    }
}
