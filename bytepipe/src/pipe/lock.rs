//! Cooperative serialization of one side of the pipe.
//!
//! A [`SideLock`] is not a traditional mutex: it serializes *publication* on
//! one side (several writer handles, or several reader handles in
//! [`Mode::SyncBoth`](crate::Mode::SyncBoth)), and acquisition failure is
//! non-fatal — deadline and cancel paths back out cleanly. The fast path is
//! a single CAS; contended acquisition spins a bounded number of yields and
//! then parks on a lock-release signal, so the uncontended case never
//! syscalls and a release wakes exactly one waiter.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use minstant::Instant;

use super::signal::{Signal, Wake};
use super::state::State;
use crate::cancel::CancelToken;
use crate::error::PipeError;
use crate::trace::trace;

/// Yield-retries before a contended acquirer parks.
const SPIN_LIMIT: u32 = 100;

#[derive(Debug)]
pub(crate) struct SideLock {
    locked: AtomicBool,
    /// Number of parked or about-to-park acquirers. Only gates the release
    /// raise; a release that misses a concurrent increment cannot strand the
    /// waiter because its spin phase re-tries the now-free lock.
    waiting: AtomicU32,
    released: Signal,
}

impl SideLock {
    pub(crate) fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiting: AtomicU32::new(0),
            released: Signal::new(),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Non-blocking acquisition for callers that must never suspend.
    pub(crate) fn try_acquire_guard(&self) -> Option<LockGuard<'_>> {
        self.try_acquire().then(|| LockGuard(self))
    }

    /// Acquires the lock, parking on the release signal under contention.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Closed`] if the pipe closes while waiting; the release
    ///   signal is re-raised so sibling waiters observe the close too.
    /// - [`PipeError::TimedOut`] / [`PipeError::Canceled`] from the wait.
    pub(crate) fn acquire<'a>(
        &'a self,
        state: &State,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<LockGuard<'a>, PipeError> {
        if self.try_acquire() {
            return Ok(LockGuard(self));
        }
        trace!("side lock contended; entering slow path");
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let result = loop {
            let mut acquired = false;
            for _ in 0..SPIN_LIMIT {
                if self.try_acquire() {
                    acquired = true;
                    break;
                }
                std::thread::yield_now();
            }
            if acquired {
                break Ok(());
            }
            match self.released.wait(deadline, cancel) {
                Wake::Signaled => {
                    if state.is_closed() {
                        // Chain the wakeup so every sibling sees the close.
                        self.released.raise();
                        break Err(PipeError::Closed { done: 0 });
                    }
                }
                Wake::TimedOut => break Err(PipeError::TimedOut { done: 0 }),
                Wake::Canceled => break Err(PipeError::Canceled { done: 0 }),
            }
        };
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        result.map(|()| LockGuard(self))
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
        if self.waiting.load(Ordering::Relaxed) > 0 {
            self.released.raise();
        }
    }

    /// Wakes parked acquirers without releasing the lock. Called on close so
    /// waiters observe the closed bit instead of parking forever.
    pub(crate) fn wake_waiters(&self) {
        self.released.raise();
    }
}

/// Holds the lock; releases on drop and hands the release edge to one
/// waiting sibling.
#[derive(Debug)]
pub(crate) struct LockGuard<'a>(&'a SideLock);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn open_state() -> State {
        State::new(8)
    }

    #[test]
    fn uncontended_acquire_release() {
        let lock = SideLock::new();
        let state = open_state();
        {
            let _guard = lock.acquire(&state, None, None).unwrap();
            assert!(lock.locked.load(Ordering::Relaxed));
        }
        assert!(!lock.locked.load(Ordering::Relaxed));
        // Reacquirable after the guard dropped.
        let _guard = lock.acquire(&state, None, None).unwrap();
    }

    #[test]
    fn acquire_times_out_while_held() {
        let lock = SideLock::new();
        let state = open_state();
        let _guard = lock.acquire(&state, None, None).unwrap();

        let deadline = Instant::now() + Duration::from_millis(20);
        let err = lock.acquire(&state, Some(deadline), None).unwrap_err();
        assert_eq!(err, PipeError::TimedOut { done: 0 });
        assert_eq!(lock.waiting.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn cancel_backs_out_of_acquire() {
        let lock = SideLock::new();
        let state = open_state();
        let _guard = lock.acquire(&state, None, None).unwrap();

        let token = CancelToken::new();
        let canceler = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceler.cancel();
        });
        let err = lock.acquire(&state, None, Some(&token)).unwrap_err();
        assert_eq!(err, PipeError::Canceled { done: 0 });
        handle.join().unwrap();
    }

    #[test]
    fn close_unblocks_waiters() {
        let lock = Arc::new(SideLock::new());
        let state = Arc::new(open_state());
        let _guard = lock.acquire(&state, None, None).unwrap();

        let waiter_lock = Arc::clone(&lock);
        let waiter_state = Arc::clone(&state);
        let waiter = std::thread::spawn(move || {
            waiter_lock
                .acquire(&waiter_state, None, None)
                .map(|_| ())
                .unwrap_err()
        });

        std::thread::sleep(Duration::from_millis(20));
        state.close();
        lock.wake_waiters();
        assert_eq!(waiter.join().unwrap(), PipeError::Closed { done: 0 });
    }

    #[test]
    fn contended_handoff_serializes() {
        let lock = Arc::new(SideLock::new());
        let state = Arc::new(open_state());
        let in_critical = Arc::new(AtomicU32::new(0));
        let total = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let state = Arc::clone(&state);
            let in_critical = Arc::clone(&in_critical);
            let total = Arc::clone(&total);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    let _guard = lock.acquire(&state, None, None).unwrap();
                    assert_eq!(
                        in_critical.fetch_add(1, Ordering::AcqRel),
                        0,
                        "two holders inside the lock"
                    );
                    total.fetch_add(1, Ordering::Relaxed);
                    in_critical.fetch_sub(1, Ordering::AcqRel);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(total.load(Ordering::Relaxed), 800);
    }
}
