// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timestamps, intervals, and the kernel's timekeeping interface.
//!
//! # Types for describing time
//!
//! `TickTime` represents a specific point in time, measured as a number of
//! ticks since boot. It's a 64-bit count, which at the standard 1 kHz tick rate
//! overflows every 584 million years. This lets us ignore overflows in
//! timestamps, making everything simpler. `TickTime` is analogous to
//! `std::time::Instant` from the Rust standard library.
//!
//! `Ticks` represents a relative time interval in ticks. This uses the same
//! representation as `TickTime`, so adding them together is cheap, and no
//! deadline computation ever needs a unit conversion or a 64-bit divide.
//!
//! The unit of a tick isn't fixed by this module. Periodic deadlines are
//! computed in kernel ticks; the profiler is usually fed from a faster trace
//! timer. The only requirement is that all timestamps handed to one consumer
//! come from the same counter.
//!
//! # What the kernel provides
//!
//! [`Clock`] is the read-only monotonic tick counter. [`Kernel`] adds the one
//! suspension primitive the application needs: sleep until an *absolute*
//! point in time. Sleeping for a relative interval is deliberately absent,
//! because a loop built on relative sleeps drifts by its own execution time
//! every cycle; see [`PeriodicGate`][crate::periodic::PeriodicGate].

use core::future::Future;
use core::ops::{Add, AddAssign};

#[cfg(feature = "systick")]
pub mod systick;

/// Represents a moment in time by the value of a monotonic tick counter.
/// System-specific analog of `std::time::Instant`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickTime(u64);

impl TickTime {
    /// The moment the counter started.
    pub const BOOT: Self = Self(0);

    /// Constructs a `TickTime` value describing a certain number of ticks
    /// since boot.
    pub const fn from_ticks_since_boot(t: u64) -> Self {
        Self(t)
    }

    /// Returns the number of ticks since boot.
    pub const fn ticks_since_boot(self) -> u64 {
        self.0
    }

    /// Subtracts an earlier time from this time, giving the amount of time
    /// between them measured in `Ticks`.
    ///
    /// # Panics
    ///
    /// If this time is not actually `>= earlier`.
    pub fn ticks_since(self, earlier: TickTime) -> Ticks {
        Ticks(self.0.checked_sub(earlier.0).unwrap())
    }

    /// Subtracts an earlier time from this time, or returns `None` if
    /// `earlier` is actually later.
    pub fn checked_ticks_since(self, earlier: TickTime) -> Option<Ticks> {
        self.0.checked_sub(earlier.0).map(Ticks)
    }

    /// Subtracts an earlier time from this time, producing zero if `earlier`
    /// is actually later.
    pub fn saturating_ticks_since(self, earlier: TickTime) -> Ticks {
        Ticks(self.0.saturating_sub(earlier.0))
    }

    /// Adds some ticks to `self`, checking for overflow. Note that since we use
    /// 64 bit ticks, overflow is unlikely in practice.
    pub fn checked_add(self, ticks: Ticks) -> Option<Self> {
        self.0.checked_add(ticks.0).map(TickTime)
    }
}

impl From<TickTime> for u64 {
    fn from(t: TickTime) -> Self {
        t.0
    }
}

/// A period of time measured in ticks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks(pub u64);

impl Ticks {
    /// No time at all.
    pub const ZERO: Self = Self(0);

    /// Checks whether this interval is empty.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Adds a number of ticks to a `TickTime` with normal `+` overflow behavior
/// (i.e. checked in debug builds, optionally not checked in release builds).
impl Add<Ticks> for TickTime {
    type Output = Self;
    fn add(self, other: Ticks) -> Self::Output {
        TickTime(self.0 + other.0)
    }
}

/// Adds a number of ticks to a `TickTime` with normal `+=` overflow behavior
/// (i.e. checked in debug builds, optionally not checked in release builds).
impl AddAssign<Ticks> for TickTime {
    fn add_assign(&mut self, other: Ticks) {
        self.0 += other.0;
    }
}

impl Add for Ticks {
    type Output = Self;
    fn add(self, other: Ticks) -> Self::Output {
        Ticks(self.0 + other.0)
    }
}

impl AddAssign for Ticks {
    fn add_assign(&mut self, other: Ticks) {
        self.0 += other.0;
    }
}

impl From<Ticks> for u64 {
    fn from(x: Ticks) -> Self {
        x.0
    }
}

impl From<u64> for Ticks {
    fn from(x: u64) -> Self {
        Self(x)
    }
}

/// A monotonically increasing tick counter.
///
/// Implementations must never go backwards. Two reads from the same clock
/// may return the same value.
pub trait Clock {
    /// Retrieves the current value of the tick counter.
    fn now(&self) -> TickTime;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> TickTime {
        (**self).now()
    }
}

/// The timekeeping half of the kernel contract.
pub trait Kernel: Clock {
    /// Suspends the calling task until `self.now() >= deadline`.
    ///
    /// More precisely, returns a `Future` that polls as `Pending` until the
    /// clock reaches `deadline`; then it polls `Ready`. If `deadline` is
    /// already in the past, the future resolves on its first poll.
    ///
    /// The kernel may resume the task arbitrarily late (because something of
    /// higher priority was running) but never early.
    ///
    /// # Cancellation
    ///
    /// Dropping the future must have no side effects other than forgetting
    /// the wakeup.
    fn sleep_until(&self, deadline: TickTime) -> impl Future<Output = ()>;
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn sleep_until(&self, deadline: TickTime) -> impl Future<Output = ()> {
        (**self).sleep_until(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_arithmetic() {
        let t = TickTime::from_ticks_since_boot(100);
        assert_eq!(t + Ticks(20), TickTime::from_ticks_since_boot(120));
        assert_eq!((t + Ticks(20)).ticks_since(t), Ticks(20));

        let mut u = t;
        u += Ticks(5);
        assert_eq!(u64::from(u), 105);
    }

    #[test]
    fn subtraction_flavors() {
        let early = TickTime::from_ticks_since_boot(10);
        let late = TickTime::from_ticks_since_boot(25);

        assert_eq!(late.checked_ticks_since(early), Some(Ticks(15)));
        assert_eq!(early.checked_ticks_since(late), None);
        assert_eq!(early.saturating_ticks_since(late), Ticks::ZERO);
    }

    #[test]
    #[should_panic]
    fn ticks_since_panics_when_reversed() {
        let early = TickTime::from_ticks_since_boot(10);
        let late = TickTime::from_ticks_since_boot(25);
        let _ = early.ticks_since(late);
    }
}
