//! Cancellation tokens for blocking pipe operations.
//!
//! A [`CancelToken`] is a cheaply cloneable handle to a sticky flag. Any
//! blocking operation that accepts a token re-checks the flag around every
//! park, and [`CancelToken::cancel`] wakes the notification signals those
//! operations are parked on, so cancellation takes effect without waiting
//! for pipe traffic.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::pipe::signal::SignalInner;
use crate::trace::trace;

/// Waiter registrations are pruned once the list grows past this many
/// entries. A token shared across many pipes keeps at most one live entry
/// per signal, so the list stays tiny in practice.
const PRUNE_THRESHOLD: usize = 64;

/// A sticky, cloneable cancellation flag.
///
/// All clones observe the same flag. Once [`cancel`](Self::cancel) has been
/// called the token stays canceled forever; blocked operations return
/// [`Canceled`](crate::PipeError::Canceled) with their partial progress.
///
/// # Example
///
/// ```
/// use bytepipe::CancelToken;
///
/// let token = CancelToken::new();
/// let clone = token.clone();
/// assert!(!clone.is_canceled());
/// token.cancel();
/// assert!(clone.is_canceled());
/// ```
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    canceled: AtomicBool,
    /// Signals with a parked waiter that asked to be woken on cancel.
    waiters: Mutex<Vec<Weak<SignalInner>>>,
}

impl CancelToken {
    /// Creates a token in the not-canceled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Idempotent; wakes every registered waiter.
    pub fn cancel(&self) {
        if self.inner.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!("cancel token fired");
        // Take the list outside the lock so wakeups don't hold it.
        let waiters = std::mem::take(&mut *self.inner.waiters.lock());
        for waiter in waiters {
            if let Some(signal) = waiter.upgrade() {
                signal.wake_all();
            }
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Asks to have `signal` woken when the token fires.
    ///
    /// Callers must re-check [`is_canceled`](Self::is_canceled) after
    /// registering and before parking: a cancel that lands in between has
    /// already drained the list and will not wake anyone.
    pub(crate) fn register(&self, signal: &Arc<SignalInner>) {
        let mut waiters = self.inner.waiters.lock();
        if waiters.iter().any(|w| w.as_ptr() == Arc::as_ptr(signal)) {
            return;
        }
        waiters.push(Arc::downgrade(signal));
        if waiters.len() > PRUNE_THRESHOLD {
            waiters.retain(|w| w.strong_count() > 0);
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_sticky_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(!token.is_canceled());
        clone.cancel();
        assert!(token.is_canceled());

        // Idempotent.
        token.cancel();
        assert!(clone.is_canceled());
    }

    #[test]
    fn registration_deduplicates() {
        let token = CancelToken::new();
        let signal = Arc::new(SignalInner::default());

        for _ in 0..10 {
            token.register(&signal);
        }
        assert_eq!(token.inner.waiters.lock().len(), 1);
    }

    #[test]
    fn dead_registrations_are_pruned() {
        let token = CancelToken::new();
        for _ in 0..=PRUNE_THRESHOLD {
            token.register(&Arc::new(SignalInner::default()));
        }
        // Every registered signal was dropped immediately, so the prune pass
        // that ran on overflow emptied the list (bar the final insert).
        assert!(token.inner.waiters.lock().len() <= 1);
    }
}
