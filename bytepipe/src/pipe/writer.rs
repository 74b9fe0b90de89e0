//! Write end of the pipe.

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

/// Write end of the pipe.
///
/// Exactly one writer handle exists in [`Mode::Spsc`](crate::Mode::Spsc);
/// the synchronized modes allow any number of handles via
/// [`clone_handle`](Self::clone_handle), serialized by a cooperative writer
/// lock so concurrent writes never interleave within one call.
///
/// # Thread Safety
///
/// `PipeWriter` is [`Send`] but **not** [`Sync`]: move a handle (or a clone)
/// to each producing thread instead of sharing one.
///
/// Dropping the last writer handle closes the pipe so the reader observes
/// end-of-stream instead of blocking forever.
pub struct PipeWriter {
    shared: Arc<Shared>,
    /// Absolute deadline applied to every blocking call; `None` blocks
    /// forever.
    deadline: Option<Instant>,
    _unsync: PhantomUnsync,
}

impl PipeWriter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            deadline: None,
            _unsync: PhantomData,
        }
    }

    /// Capacity of the ring in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Bytes that can be written without blocking. Advisory: the reader may
    /// free more at any moment.
    #[must_use]
    pub fn space(&self) -> usize {
        self.shared.capacity() - self.shared.state.load().readable()
    }

    /// Whether the pipe has been closed. Monotonic.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the pipe, waking all blockers on both sides. Idempotent. The
    /// reader still drains any buffered bytes before observing
    /// end-of-stream.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Sets the deadline for subsequent blocking calls on this handle.
    /// `None` removes it.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// The deadline currently applied to blocking calls.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Creates another handle to the same write end.
    ///
    /// # Panics
    ///
    /// Panics in [`Mode::Spsc`](crate::Mode::Spsc): a second unserialized
    /// producer is a programming error.
    #[must_use]
    pub fn clone_handle(&self) -> Self {
        assert!(
            self.shared.mode.synchronized_writers(),
            "writer handles can only be cloned on a pipe built with synchronized writers"
        );
        self.shared.writers.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
            deadline: self.deadline,
            _unsync: PhantomData,
        }
    }

    /// Writes all of `buf`, blocking while the pipe is full.
    ///
    /// A zero-length `buf` returns immediately: `Ok(0)` while the pipe is
    /// open, `Closed` once it is closed.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Closed`] when the pipe closes before the write
    ///   completes; `done` carries the bytes already published (they remain
    ///   readable)
    /// - [`PipeError::TimedOut`] when this handle's deadline expires
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, PipeError> {
        self.write_inner(buf, None)
    }

    /// Like [`write`](Self::write), additionally interruptible by `cancel`.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write), plus [`PipeError::Canceled`] with the
    /// partial count when the token fires.
    pub fn write_with_cancel(
        &mut self,
        buf: &[u8],
        cancel: &CancelToken,
    ) -> Result<usize, PipeError> {
        self.write_inner(buf, Some(cancel))
    }

    /// Writes a single byte.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn write_byte(&mut self, byte: u8) -> Result<(), PipeError> {
        self.write(&[byte]).map(|_| ())
    }

    /// Writes a sequence of chunks under a single lock acquisition, so the
    /// chunks of one call never interleave with another writer's bytes.
    /// Stops at the first error, reporting the total written so far.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write); `done` is the total across chunks.
    pub fn write_vectored(&mut self, chunks: &[&[u8]]) -> Result<usize, PipeError> {
        if self.shared.is_closed() {
            return Err(PipeError::Closed { done: 0 });
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(None)?;
        let mut total = 0;
        for chunk in chunks {
            self.push_all(chunk, None, &mut total)?;
        }
        Ok(total)
    }

    /// Blocks until at least `min` bytes of free space are available.
    ///
    /// `min` is clamped up to `1`: waiting for zero bytes waits for one.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Overcap`] without blocking when `min` exceeds the
    ///   capacity
    /// - [`PipeError::Closed`] when the pipe closes first
    /// - [`PipeError::TimedOut`] when this handle's deadline expires
    pub fn write_wait(&mut self, min: usize) -> Result<(), PipeError> {
        self.write_wait_inner(min, None)
    }

    /// Like [`write_wait`](Self::write_wait), additionally interruptible by
    /// `cancel`.
    ///
    /// # Errors
    ///
    /// As [`write_wait`](Self::write_wait), plus [`PipeError::Canceled`].
    pub fn write_wait_with_cancel(
        &mut self,
        min: usize,
        cancel: &CancelToken,
    ) -> Result<(), PipeError> {
        self.write_wait_inner(min, Some(cancel))
    }

    /// Publishes all of `buf` in one state transition, blocking until the
    /// free space fits it. Readers can never observe a prefix of the chunk.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Overcap`] when `buf.len()` exceeds the capacity
    /// - [`PipeError::Closed`] / [`PipeError::TimedOut`], always with
    ///   `done: 0` — on failure nothing was published
    pub fn write_atomic(&mut self, buf: &[u8]) -> Result<(), PipeError> {
        let cap = self.shared.capacity();
        if buf.len() > cap {
            return Err(PipeError::Overcap { min: buf.len(), cap });
        }
        if buf.is_empty() {
            return if self.shared.is_closed() {
                Err(PipeError::Closed { done: 0 })
            } else {
                Ok(())
            };
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(None)?;
        loop {
            if self.shared.state.load().closed() {
                return Err(PipeError::Closed { done: 0 });
            }
            if self.shared.try_push_exact(buf) {
                return Ok(());
            }
            match self.shared.space_ready.wait(self.deadline, None) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => return Err(PipeError::Canceled { done: 0 }),
            }
        }
    }

    /// Pulls from `source` into the pipe until the source reports
    /// end-of-stream, using an internal 8 KiB scratch buffer. The lock (in
    /// synchronized modes) is held across the whole stream, and calls into
    /// `source` are serialized on this thread.
    ///
    /// # Errors
    ///
    /// [`CopyError`] with the bytes fully piped so far when `source` fails
    /// or the pipe closes or times out mid-stream.
    pub fn read_from<R: io::Read>(&mut self, source: &mut R) -> Result<u64, CopyError> {
        let _guard = self.lock_side(None).map_err(|e| CopyError {
            done: 0,
            source: e.into(),
        })?;
        let mut chunk = [0u8; COPY_CHUNK];
        let mut total: u64 = 0;
        loop {
            let n = source.read(&mut chunk).map_err(|source| CopyError {
                done: total,
                source,
            })?;
            if n == 0 {
                return Ok(total);
            }
            let mut pushed = 0;
            self.push_all(&chunk[..n], None, &mut pushed)
                .map_err(|e| CopyError {
                    done: total + pushed as u64,
                    source: e.into(),
                })?;
            total += n as u64;
        }
    }

    /// Blocks until at least one byte of space is free, then writes what
    /// fits. Backs the [`io::Write`] impl.
    fn write_some(&mut self, buf: &[u8], cancel: Option<&CancelToken>) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return Ok(0);
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(cancel)?;
        loop {
            if self.shared.state.load().closed() {
                return Err(PipeError::Closed { done: 0 });
            }
            let n = self.shared.push_slice(buf);
            if n > 0 {
                return Ok(n);
            }
            match self.shared.space_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => return Err(PipeError::Canceled { done: 0 }),
            }
        }
    }

    fn write_inner(&mut self, buf: &[u8], cancel: Option<&CancelToken>) -> Result<usize, PipeError> {
        if buf.is_empty() {
            return if self.shared.is_closed() {
                Err(PipeError::Closed { done: 0 })
            } else {
                Ok(0)
            };
        }
        if self.shared.is_closed() {
            return Err(PipeError::Closed { done: 0 });
        }
        check_deadline(self.deadline)?;
        let _guard = self.lock_side(cancel)?;
        let mut total = 0;
        self.push_all(buf, cancel, &mut total)?;
        Ok(total)
    }

    /// Core write loop; requires the writer lock (when present) to be held.
    /// `total` is updated as bytes are published so errors report overall
    /// progress even across [`write_vectored`](Self::write_vectored) chunks.
    /// The closed bit is checked before the length, so an empty chunk still
    /// observes a close that raced in since the previous chunk.
    fn push_all(
        &self,
        buf: &[u8],
        cancel: Option<&CancelToken>,
        total: &mut usize,
    ) -> Result<(), PipeError> {
        if self.shared.is_closed() {
            return Err(PipeError::Closed { done: *total });
        }
        let mut off = 0;
        while off < buf.len() {
            if self.shared.state.load().closed() {
                return Err(PipeError::Closed { done: *total });
            }
            let n = self.shared.push_slice(&buf[off..]);
            if n > 0 {
                off += n;
                *total += n;
                continue;
            }
            match self.shared.space_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: *total }),
                Wake::Canceled => return Err(PipeError::Canceled { done: *total }),
            }
        }
        Ok(())
    }

    fn write_wait_inner(&mut self, min: usize, cancel: Option<&CancelToken>) -> Result<(), PipeError> {
        let cap = self.shared.capacity();
        if min > cap {
            return Err(PipeError::Overcap { min, cap });
        }
        let min = min.max(1);
        check_deadline(self.deadline)?;
        loop {
            let snap = self.shared.state.load();
            if snap.closed() {
                return Err(PipeError::Closed { done: 0 });
            }
            if cap - snap.readable() >= min {
                return Ok(());
            }
            match self.shared.space_ready.wait(self.deadline, cancel) {
                Wake::Signaled => {}
                Wake::TimedOut => return Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => return Err(PipeError::Canceled { done: 0 }),
            }
        }
    }

    fn lock_side(&self, cancel: Option<&CancelToken>) -> Result<Option<LockGuard<'_>>, PipeError> {
        match &self.shared.writer_lock {
            Some(lock) => lock
                .acquire(&self.shared.state, self.deadline, cancel)
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Conventional stream semantics: blocks for at least one byte of space,
/// writes what fits, and maps a closed pipe to
/// [`io::ErrorKind::BrokenPipe`]. `flush` is a no-op — published bytes are
/// immediately visible to the reader.
impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_some(buf, None).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if self.shared.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.close();
        }
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("capacity", &self.capacity())
            .field("space", &self.space())
            .field("closed", &self.is_closed())
            .finish()
    }
}
