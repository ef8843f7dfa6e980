// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A bounded queue for moving messages from several tasks into one.
//!
//! This is a "multi-producer, single-consumer" queue that splits into separate
//! `Sender` and `Receiver` endpoints. `Sender` is `Copy`, so every producer can
//! hold its own; there is at most one `Receiver` alive in your program, so
//! there's only ever one consumer.
//!
//! You create a queue by calling `Queue::new`, which needs no arguments:
//! storage for all `N` slots lives inline, so the queue can be placed in a
//! `static` or on a stack as you see fit. To actually use the queue, you must
//! call `Queue::split` to break it into the two kinds of endpoint. Both
//! endpoints borrow the central `Queue`, so they can't outlive it.
//!
//! Neither end ever waits. [`Sender::try_send`] hands the value back if the
//! queue is full, and [`Receiver::try_recv`] returns `None` if it's empty. In
//! this application a rejected message is simply dropped: producers run
//! periodically and will have something new to say next cycle.
//!
//! # Implementation
//!
//! Producers run at different priorities and can preempt each other, and the
//! consumer, at any instruction. Each operation therefore runs inside a
//! `critical-section` lock, which makes it atomic with respect to every other
//! task and interrupt. The locked regions are a handful of instructions long
//! and never loop.
//!
//! Unlike a lock-free Lamport queue, all `N` slots are usable, because the
//! occupancy is tracked explicitly instead of being inferred from the two
//! indices.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;

/// A bounded FIFO of `N` values of type `T`.
///
/// See the module docs for details.
pub struct Queue<T, const N: usize> {
    ring: Mutex<RefCell<Ring<T, N>>>,
}

/// Counters describing a queue's history.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStats {
    /// Values accepted by `try_send`.
    pub sent: u32,
    /// Values handed back by `try_send` because the queue was full.
    pub rejected: u32,
    /// Largest number of values that have been queued at once.
    pub high_water: usize,
}

/// The part of the queue guarded by the lock.
struct Ring<T, const N: usize> {
    slots: [Option<T>; N],
    /// Index of the oldest value, the next one to be received. Must fall in
    /// the range `0..N` (or be 0 if `N` is 0).
    head: usize,
    /// Number of occupied slots, `0..=N`. The occupied slots are `len`
    /// consecutive slots starting at `head`, wrapping.
    len: usize,
    stats: QueueStats,
}

impl<T, const N: usize> Ring<T, N> {
    const EMPTY: Option<T> = None;

    fn next_index(i: usize) -> usize {
        // This produced better code than using remainder on ARMv7-M last
        // I checked.
        if i + 1 == N { 0 } else { i + 1 }
    }

    fn push(&mut self, value: T) -> Result<(), T> {
        if self.len == N {
            self.stats.rejected = self.stats.rejected.wrapping_add(1);
            return Err(value);
        }

        let tail = if self.head + self.len >= N {
            self.head + self.len - N
        } else {
            self.head + self.len
        };
        self.slots[tail] = Some(value);
        self.len += 1;

        self.stats.sent = self.stats.sent.wrapping_add(1);
        self.stats.high_water = self.stats.high_water.max(self.len);
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        let value = self.slots[self.head].take();
        self.head = Self::next_index(self.head);
        self.len -= 1;
        value
    }
}

impl<T, const N: usize> Queue<T, N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring {
                slots: [Ring::<T, N>::EMPTY; N],
                head: 0,
                len: 0,
                stats: QueueStats {
                    sent: 0,
                    rejected: 0,
                    high_water: 0,
                },
            })),
        }
    }

    /// Creates a send and receive endpoint for this queue. Note that an
    /// exclusive borrow of the queue exists as long as either endpoint exists,
    /// ensuring that at most one `Receiver` exists at any point in the
    /// program. The `Sender` can be copied freely.
    ///
    /// You can, however, drop the first pair of endpoints and make a new pair
    /// later -- that's fine.
    pub fn split(&mut self) -> (Sender<'_, T, N>, Receiver<'_, T, N>) {
        let q = &*self;
        (Sender { q }, Receiver { q })
    }

    /// The fixed number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of values currently queued.
    pub fn len(&self) -> usize {
        self.with_ring(|r| r.len)
    }

    /// Checks whether the queue holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Returns the queue's counters.
    pub fn stats(&self) -> QueueStats {
        self.with_ring(|r| r.stats)
    }

    fn with_ring<R>(&self, op: impl FnOnce(&mut Ring<T, N>) -> R) -> R {
        critical_section::with(|cs| {
            let mut ring = self.ring.borrow_ref_mut(cs);
            op(&mut *ring)
        })
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for Queue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Queue endpoint for sending data. Access to a `Sender` _only_ gives you the
/// right to send data and enquire about the queue's state.
///
/// See the module docs for more details.
pub struct Sender<'q, T, const N: usize> {
    q: &'q Queue<T, N>,
}

impl<T, const N: usize> Clone for Sender<'_, T, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const N: usize> Copy for Sender<'_, T, N> {}

impl<T, const N: usize> fmt::Debug for Sender<'_, T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sender").field(self.q).finish()
    }
}

impl<T, const N: usize> Sender<'_, T, N> {
    /// Attempts to stuff `value` into the queue, behind everything that's
    /// already there.
    ///
    /// If there is space, ownership of `value` moves into the queue and this
    /// returns `Ok(())`.
    ///
    /// If there is not space, this returns `Err(value)` -- that is, ownership
    /// of `value` is handed back to you -- and leaves the queue's contents
    /// untouched. This never waits for room to appear.
    pub fn try_send(&self, value: T) -> Result<(), T> {
        self.q.with_ring(|r| r.push(value))
    }

    /// Checks if there is room to send at least one value. Another producer
    /// may take that room before you get to it, so this is advisory.
    pub fn can_send(&self) -> bool {
        !self.q.is_full()
    }

    /// The queue this endpoint feeds.
    pub fn queue(&self) -> &Queue<T, N> {
        self.q
    }
}

/// Queue endpoint for receiving data. There is only one per queue.
///
/// See the module docs for more details.
pub struct Receiver<'q, T, const N: usize> {
    q: &'q Queue<T, N>,
}

impl<T, const N: usize> fmt::Debug for Receiver<'_, T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Receiver").field(self.q).finish()
    }
}

impl<T, const N: usize> Receiver<'_, T, N> {
    /// Removes the oldest value from the queue, if the queue is not empty.
    ///
    /// If the queue is empty, returns `None` immediately.
    pub fn try_recv(&mut self) -> Option<T> {
        self.q.with_ring(Ring::pop)
    }

    /// Checks if there is at least one value available.
    ///
    /// Because the `Receiver` is the only thing that removes values, if this
    /// returns `true`, the condition will remain true until a `try_recv`
    /// happens through `self`.
    pub fn can_recv(&self) -> bool {
        !self.q.is_empty()
    }

    /// The queue this endpoint drains.
    pub fn queue(&self) -> &Queue<T, N> {
        self.q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_through_wraparound() {
        let mut q: Queue<u8, 3> = Queue::new();
        let (tx, mut rx) = q.split();

        for i in 0..10 {
            assert_eq!(tx.try_send(i), Ok(()));
            assert_eq!(tx.try_send(i + 100), Ok(()));
            assert_eq!(rx.try_recv(), Some(i));
            assert_eq!(rx.try_recv(), Some(i + 100));
            assert_eq!(rx.try_recv(), None);
        }
    }

    #[test]
    fn full_queue_hands_value_back_unchanged() {
        let mut q: Queue<&'static str, 3> = Queue::new();
        let (tx, mut rx) = q.split();

        for m in ["a", "b", "c"] {
            tx.try_send(m).unwrap();
        }
        assert!(!tx.can_send());
        assert_eq!(tx.try_send("d"), Err("d"));
        assert_eq!(tx.try_send("e"), Err("e"));

        assert_eq!(rx.queue().len(), 3);
        assert_eq!(rx.try_recv(), Some("a"));
        assert_eq!(rx.try_recv(), Some("b"));
        assert_eq!(rx.try_recv(), Some("c"));
        assert_eq!(rx.try_recv(), None);

        let stats = q.stats();
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.high_water, 3);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut q: Queue<u8, 0> = Queue::new();
        let (tx, mut rx) = q.split();
        assert_eq!(tx.try_send(1), Err(1));
        assert_eq!(rx.try_recv(), None);
        assert!(q.is_full());
        assert!(q.is_empty());
    }

    #[test]
    fn nonempty_drop_releases_values() {
        use std::rc::Rc;

        let tracker = Rc::new(());
        {
            let mut q: Queue<Rc<()>, 3> = Queue::new();
            let (tx, _rx) = q.split();
            tx.try_send(tracker.clone()).unwrap();
            tx.try_send(tracker.clone()).unwrap();
            assert_eq!(Rc::strong_count(&tracker), 3);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }
}
