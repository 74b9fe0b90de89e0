//! Read end of the pipe.

use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use minstant::Instant;

use super::lock::LockGuard;
use super::signal::Wake;
use super::{COPY_CHUNK, PhantomUnsync, Shared, check_deadline};
use crate::cancel::CancelToken;
use crate::error::{CopyError, PipeError};

/// Read end of the pipe.
///
/// Exactly one reader handle exists unless the pipe was built with
/// [`Mode::SyncBoth`](crate::Mode::SyncBoth), in which case
/// [`clone_handle`](Self::clone_handle) hands out siblings serialized by a
/// reader lock.
///
/// # Thread Safety
///
/// `PipeReader` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&PipeReader` (no concurrent reads through one handle)
///
/// Dropping the last reader handle closes the pipe so writers cannot block
/// forever against a vanished consumer.
pub struct PipeReader {
    shared: Arc<Shared>,
    /// Absolute deadline applied to every blocking call; `None` blocks
    /// forever.
    deadline: Option<Instant>,
    _unsync: PhantomUnsync,
}

impl PipeReader {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            deadline: None,
            _unsync: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Capacity of the ring in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Bytes available for immediate read. Advisory: a writer may publish
    /// more at any moment.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.load().readable()
    }

    /// Whether the pipe has been closed. Monotonic: once `true`, always
    /// `true`. Buffered bytes remain readable after close.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the pipe, waking all blockers on both sides. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Sets the deadline for subsequent blocking calls on this handle.
    /// `None` removes it. A deadline already in the past makes the next
    /// blocking call fail with [`PipeError::TimedOut`] before doing any
    /// work.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// The deadline currently applied to blocking calls.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Creates another handle to the same read end.
    ///
    /// # Panics
    ///
    /// Panics unless the pipe was built with
    /// [`Mode::SyncBoth`](crate::Mode::SyncBoth); a second reader on an
    /// unserialized pipe is a programming error.
    #[must_use]
    pub fn clone_handle(&self) -> Self {
        assert!(
            self.shared.mode.synchronized_readers(),
            "reader handles can only be cloned on a pipe built with Mode::SyncBoth"
        );
        self.shared.readers.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
            deadline: self.deadline,
            _unsync: PhantomData,
        }
    }

    /// Fills all of `buf`, blocking while the pipe is empty.
    ///
    /// A zero-length `buf` returns immediately: `Ok(0)` while the pipe is
    /// open, `Closed` once it is closed.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Closed`] when the pipe closes before `buf` is full;
    ///   `done` carries the final partial chunk (buffered bytes are always
    ///   delivered before end-of-stream is reported)
    /// - [`PipeError::TimedOut`] when this handle's deadline expires
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, PipeError> {
        self.read_inner(buf, None)
    }

    /// Like [`read`](Self::read), additionally interruptible by `cancel`.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read), plus [`PipeError::Canceled`] with the
    /// partial count when the token fires.
    pub fn read_with_cancel(
        &mut self,
        buf: &mut [u8],
        cancel: &CancelToken,
    ) -> Result<usize, PipeError> {
        self.read_inner(buf, Some(cancel))
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    pub fn read_byte(&mut self) -> Result<u8, PipeError> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    /// Copies up to `buf.len()` buffered bytes without consuming them.
    /// Never suspends.
    ///
    /// Advisory in [`Mode::SyncBoth`](crate::Mode::SyncBoth): when a sibling
    /// handle currently holds the reader side, `peek` reports zero bytes
    /// instead of waiting for it.
    ///
    /// # Errors
    ///
    /// [`PipeError::Closed`] when the pipe is closed; `done` still carries
    /// the number of bytes copied.
    pub fn peek(&self, buf: &mut [u8]) -> Result<usize, PipeError> {
        let _guard = match &self.shared.reader_lock {
            Some(lock) => match lock.try_acquire_guard() {
                Some(guard) => Some(guard),
                None => {
                    return if self.shared.is_closed() {
                        Err(PipeError::Closed { done: 0 })
                    } else {
                        Ok(0)
                    };
                }
            },
            None => None,
        };
        let snap = self.shared.state.load();
        let n = snap.readable().min(buf.len());
        if n > 0 {
            self.shared.storage.copy_out(snap.head(), &mut buf[..n]);
        }
        if snap.closed() {
            Err(PipeError::Closed { done: n })
        } else {
            Ok(n)
        }
    }

    /// Discards exactly `n` bytes, blocking like [`read`](Self::read) while
    /// the pipe is empty.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read); `done` is the number of bytes discarded.
    pub fn skip(&mut self, n: usize) -> Result<usize, PipeError> {
        self.skip_inner(n, None)
    }

    /// Like [`skip`](Self::skip), additionally interruptible by `cancel`.
    ///
    /// # Errors
    ///
    /// As [`skip`](Self::skip), plus [`PipeError::Canceled`].
    pub fn skip_with_cancel(&mut self, n: usize, cancel: &CancelToken) -> Result<usize, PipeError> {
        self.skip_inner(n, Some(cancel))
    }

    /// Blocks until at least `min` bytes are buffered.
    ///
    /// `min` is clamped up to `1`: waiting for zero bytes waits for one.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Overcap`] without blocking when `min` exceeds the
    ///   capacity — no amount of writing can ever satisfy it
    /// - [`PipeError::Closed`] when the pipe closes first
    /// - [`PipeError::TimedOut`] when this handle's deadline expires
    pub fn read_wait(&mut self, min: usize) -> Result<(), PipeError> {
        self.read_wait_inner(min, None)
    }

    /// Like [`read_wait`](Self::read_wait), additionally interruptible by
    /// `cancel`.
    ///
    /// # Errors
    ///
    /// As [`read_wait`](Self::read_wait), plus [`PipeError::Canceled`].
    pub fn read_wait_with_cancel(
        &mut self,
        min: usize,
        cancel: &CancelToken,
    ) -> Result<(), PipeError> {
        self.read_wait_inner(min, Some(cancel))
    }

    /// Consumes exactly `buf.len()` bytes in one state transition, blocking
    /// until that many are buffered. On failure nothing is consumed.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Overcap`] when `buf.len()` exceeds the capacity
    /// - [`PipeError::Closed`] / [`PipeError::TimedOut`], always with
    ///   `done: 0`
    pub fn read_atomic(&mut self, buf: &mut [u8]) -> Result<(), PipeError> {
        let cap = self.shared.capacity();
        if buf.len() > cap {
            return Err(PipeError::Overcap { min: buf.len(), cap });
        }
        if buf.is_empty() {
            return Ok(());
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(None)?;
        loop {
            if self.shared.try_pop_exact(buf) {
                return Ok(());
            }
            let snap = self.shared.state.load();
            if snap.closed() && snap.readable() < buf.len() {
                self.shared.data_ready.raise();
                return Err(PipeError::Closed { done: 0 });
            }
            match self.shared.data_ready.wait(self.deadline, None) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => return Err(PipeError::Canceled { done: 0 }),
            }
        }
    }

    /// Drains the pipe into `sink` until the pipe is closed and empty,
    /// using an internal 8 KiB scratch buffer. Calls into `sink` are
    /// serialized on this thread.
    ///
    /// # Errors
    ///
    /// [`CopyError`] with the bytes moved so far when `sink` fails or this
    /// handle's deadline expires. A closed-and-drained pipe is success, not
    /// an error.
    pub fn write_to<W: io::Write>(&mut self, sink: &mut W) -> Result<u64, CopyError> {
        let mut chunk = [0u8; COPY_CHUNK];
        let mut total: u64 = 0;
        loop {
            match self.read_some(&mut chunk, None) {
                Ok(n) => {
                    sink.write_all(&chunk[..n]).map_err(|source| CopyError {
                        done: total,
                        source,
                    })?;
                    total += n as u64;
                }
                Err(PipeError::Closed { .. }) => return Ok(total),
                Err(e) => {
                    return Err(CopyError {
                        done: total,
                        source: e.into(),
                    });
                }
            }
        }
    }

    /// Blocks until at least one byte is available, then drains up to
    /// `buf.len()` bytes. Backs the [`io::Read`] impl and
    /// [`write_to`](Self::write_to).
    fn read_some(&mut self, buf: &mut [u8], cancel: Option<&CancelToken>) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(cancel)?;
        loop {
            let n = self.shared.pop_slice(buf);
            if n > 0 {
                return Ok(n);
            }
            let snap = self.shared.state.load();
            if snap.readable() > 0 {
                continue;
            }
            if snap.closed() {
                self.shared.data_ready.raise();
                return Err(PipeError::Closed { done: 0 });
            }
            match self.shared.data_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => return Err(PipeError::Canceled { done: 0 }),
            }
        }
    }

    fn read_inner(&mut self, buf: &mut [u8], cancel: Option<&CancelToken>) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return if self.shared.is_closed() {
                Err(PipeError::Closed { done: 0 })
            } else {
                Ok(0)
            };
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(cancel)?;
        let mut done = 0;
        loop {
            let n = self.shared.pop_slice(&mut buf[done..]);
            if n > 0 {
                done += n;
                if done == buf.len() {
                    return Ok(done);
                }
                continue;
            }
            let snap = self.shared.state.load();
            if snap.readable() > 0 {
                continue;
            }
            if snap.closed() {
                // Chain the end-of-stream wakeup to sibling reader handles.
                self.shared.data_ready.raise();
                return Err(PipeError::Closed { done });
            }
            match self.shared.data_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done }),
                Wake::Canceled => return Err(PipeError::Canceled { done }),
            }
        }
    }

    fn skip_inner(&mut self, to_skip: usize, cancel: Option<&CancelToken>) -> Result<usize, PipeError> {
        if to_skip == 0 {
            return if self.shared.is_closed() {
                Err(PipeError::Closed { done: 0 })
            } else {
                Ok(0)
            };
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(cancel)?;
        let mut done = 0;
        loop {
            let n = self.shared.skip_slice(to_skip - done);
            if n > 0 {
                done += n;
                if done == to_skip {
                    return Ok(done);
                }
                continue;
            }
            let snap = self.shared.state.load();
            if snap.readable() > 0 {
                continue;
            }
            if snap.closed() {
                self.shared.data_ready.raise();
                return Err(PipeError::Closed { done });
            }
            match self.shared.data_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done }),
                Wake::Canceled => return Err(PipeError::Canceled { done }),
            }
        }
    }

    fn read_wait_inner(&mut self, min: usize, cancel: Option<&CancelToken>) -> Result<(), PipeError> {
        let cap = self.shared.capacity();
        if min > cap {
            return Err(PipeError::Overcap { min, cap });
        }
        let min = min.max(1);
        check_deadline(self.deadline)?;
        loop {
            let snap = self.shared.state.load();
            if snap.readable() >= min {
                return Ok(());
            }
            if snap.closed() {
                self.shared.data_ready.raise();
                return Err(PipeError::Closed { done: 0 });
            }
            match self.shared.data_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => return Err(PipeError::Canceled { done: 0 }),
            }
        }
    }

    fn lock_side(&self, cancel: Option<&CancelToken>) -> Result<Option<LockGuard<'_>>, PipeError> {
        match &self.shared.reader_lock {
            Some(lock) => lock
                .acquire(&self.shared.state, self.deadline, cancel)
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Conventional stream semantics: blocks for at least one byte, returns what
/// is available, and reports end-of-stream as `Ok(0)` once the pipe is
/// closed and drained. Deadline expiry maps to [`io::ErrorKind::TimedOut`].
impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_some(buf, None) {
            Ok(n) => Ok(n),
            Err(PipeError::Closed { .. }) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if self.shared.readers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader")
            .field("capacity", &self.capacity())
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}
