//! One-slot, edge-triggered notification signals.
//!
//! A [`Signal`] carries no data: a pending edge means "at least one change
//! has happened since the last drain". Raising an already-raised signal is
//! absorbed, and a lost edge is harmless because every blocker re-reads the
//! ring state after waking — a spurious wake costs a loop iteration, never
//! correctness.

use std::sync::Arc;

use minstant::Instant;
use parking_lot::{Condvar, Mutex};

use crate::cancel::CancelToken;

/// How a [`Signal::wait`] ended. The caller re-checks ring state in every
/// case; the outcome only decides which error (if any) to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    /// An edge was consumed (or a wakeup arrived; possibly spurious).
    Signaled,
    /// The deadline passed before an edge arrived.
    TimedOut,
    /// The cancel token fired.
    Canceled,
}

/// Shared slot + condvar. Held in an [`Arc`] so a [`CancelToken`] can keep a
/// weak reference and wake parked waiters directly.
#[derive(Default)]
#[derive(Debug)]
pub(crate) struct SignalInner {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl SignalInner {
    /// Wakes every parked waiter without raising an edge. Used by
    /// cancellation; woken waiters observe the token, not the slot.
    pub(crate) fn wake_all(&self) {
        // Taking the lock orders this wakeup after any waiter that checked
        // the token and is about to park.
        let _pending = self.pending.lock();
        self.cond.notify_all();
    }
}

/// A one-slot edge-triggered signal.
#[derive(Debug)]
pub(crate) struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner::default()),
        }
    }

    /// Publishes an edge. One parked waiter is woken; if the slot is already
    /// raised the edge is absorbed.
    pub(crate) fn raise(&self) {
        let mut pending = self.inner.pending.lock();
        if !*pending {
            *pending = true;
            self.inner.cond.notify_one();
        }
    }

    /// Blocks until an edge is consumed, the deadline passes, or the token
    /// fires. `None` deadline means wait forever; a deadline already in the
    /// past reports [`Wake::TimedOut`] unless an edge is already pending.
    pub(crate) fn wait(&self, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Wake {
        if let Some(token) = cancel {
            if token.is_canceled() {
                return Wake::Canceled;
            }
            token.register(&self.inner);
        }
        let mut pending = self.inner.pending.lock();
        loop {
            if *pending {
                *pending = false;
                return Wake::Signaled;
            }
            if let Some(token) = cancel
                && token.is_canceled()
            {
                return Wake::Canceled;
            }
            match deadline {
                None => self.inner.cond.wait(&mut pending),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Wake::TimedOut;
                    }
                    let _ = self.inner.cond.wait_for(&mut pending, d.duration_since(now));
                }
            }
        }
    }
}
