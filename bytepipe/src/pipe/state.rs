//! The packed ring-state word.
//!
//! The entire pipe state lives in one [`AtomicU64`], laid out MSB to LSB:
//!
//! | Bits  | Field      | Meaning                                      |
//! |-------|------------|----------------------------------------------|
//! | 63    | `closed`   | sticky close flag, never clears              |
//! | 62–32 | `head`     | offset of the next byte to read, `[0, cap)`  |
//! | 31    | *reserved* | historic write-lock flag, always zero        |
//! | 30–0  | `readable` | bytes currently buffered, `[0, cap]`         |
//!
//! Packing every field into one word makes each load a complete snapshot:
//! the reader can never observe `head` advanced without the matching
//! `readable` decrement. The reserved bit stays zero because `readable`
//! never exceeds [`MAX_CAPACITY`](crate::pipe::MAX_CAPACITY) = 2^30.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sticky close flag.
const CLOSED: u64 = 1 << 63;

/// Mask for the 31-bit `head` and `readable` fields.
const FIELD: u64 = (1 << 31) - 1;

/// Bit offset of `head` within the word.
const HEAD_SHIFT: u32 = 32;

/// A decoded copy of one atomic load. All accessors read the same consistent
/// word; there is no torn state to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot {
    raw: u64,
}

impl Snapshot {
    #[inline]
    pub(crate) const fn closed(self) -> bool {
        self.raw & CLOSED != 0
    }

    /// Offset of the oldest unread byte within storage.
    #[inline]
    pub(crate) const fn head(self) -> usize {
        ((self.raw >> HEAD_SHIFT) & FIELD) as usize
    }

    /// Bytes currently buffered and available to the reader.
    #[inline]
    pub(crate) const fn readable(self) -> usize {
        (self.raw & FIELD) as usize
    }
}

/// The shared state word plus the wrap mask it is interpreted against.
pub(crate) struct State {
    bits: AtomicU64,
    /// `capacity - 1`; capacity is a power of two.
    mask: usize,
}

impl State {
    /// # Panics
    ///
    /// Debug-asserts that `capacity` is a power of two; the constructors in
    /// [`crate::pipe`] guarantee it.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            bits: AtomicU64::new(0),
            mask: capacity - 1,
        }
    }

    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// One atomic acquire load of the whole state.
    #[inline]
    pub(crate) fn load(&self) -> Snapshot {
        Snapshot {
            raw: self.bits.load(Ordering::Acquire),
        }
    }

    /// Consumes `n` bytes: advances `head` modulo capacity and shrinks
    /// `readable`, preserving the flag bits.
    ///
    /// Only the reader side calls this, so a failed CAS means a writer
    /// published more bytes (or close landed) in between; the premise of the
    /// update — `n` bytes are buffered and `head` is ours — still holds, and
    /// the loop retries against the fresh word. The successful CAS is the
    /// release fence that lets the writer reuse the consumed region.
    pub(crate) fn commit_read(&self, n: usize) {
        let mut cur = self.bits.load(Ordering::Acquire);
        loop {
            let snap = Snapshot { raw: cur };
            debug_assert!(n <= snap.readable());
            let head = (snap.head() + n) & self.mask;
            let readable = snap.readable() - n;
            let next = (cur & CLOSED) | ((head as u64) << HEAD_SHIFT) | readable as u64;
            match self
                .bits
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => {
                    cur = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Publishes `n` freshly copied bytes by bumping `readable`.
    ///
    /// A plain `fetch_add` suffices: writers are unique (SPSC mode) or hold
    /// the writer lock, so no concurrent increment can overflow the field,
    /// and the addend never carries into `head` because `readable + n` stays
    /// within the 31-bit field. The release ordering makes the copied bytes
    /// visible before the count.
    pub(crate) fn publish_write(&self, n: usize) {
        debug_assert!(n <= self.capacity());
        self.bits.fetch_add(n as u64, Ordering::AcqRel);
    }

    /// Sets the sticky close flag. Returns `true` if this call closed the
    /// pipe (false when it was already closed).
    pub(crate) fn close(&self) -> bool {
        self.bits.fetch_or(CLOSED, Ordering::AcqRel) & CLOSED == 0
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.load().closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_empty_and_open() {
        let state = State::new(16);
        let snap = state.load();
        assert!(!snap.closed());
        assert_eq!(snap.head(), 0);
        assert_eq!(snap.readable(), 0);
    }

    #[test]
    fn publish_then_commit_round_trip() {
        let state = State::new(16);
        state.publish_write(10);
        assert_eq!(state.load().readable(), 10);

        state.commit_read(4);
        let snap = state.load();
        assert_eq!(snap.head(), 4);
        assert_eq!(snap.readable(), 6);
    }

    #[test]
    fn head_wraps_at_capacity() {
        let state = State::new(8);
        state.publish_write(8);
        state.commit_read(6);
        state.publish_write(6);
        state.commit_read(5);
        let snap = state.load();
        // head = (6 + 5) mod 8
        assert_eq!(snap.head(), 3);
        assert_eq!(snap.readable(), 3);
    }

    #[test]
    fn close_is_sticky_and_reports_first_transition() {
        let state = State::new(8);
        assert!(!state.is_closed());
        assert!(state.close());
        assert!(!state.close());
        assert!(state.is_closed());
    }

    #[test]
    fn close_preserves_counters_and_drains_still_work() {
        let state = State::new(8);
        state.publish_write(5);
        state.close();
        assert_eq!(state.load().readable(), 5);
        state.commit_read(5);
        let snap = state.load();
        assert!(snap.closed());
        assert_eq!(snap.readable(), 0);
        assert_eq!(snap.head(), 5);
    }

    #[test]
    fn full_capacity_fits_the_field() {
        let cap = 1 << 30;
        let state = State::new(cap);
        state.publish_write(cap);
        let snap = state.load();
        assert_eq!(snap.readable(), cap);
        assert_eq!(snap.head(), 0);
        assert!(!snap.closed());
    }
}
