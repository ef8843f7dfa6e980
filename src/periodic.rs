// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drift-free periodic execution.
//!
//! The obvious way to run something every `P` ticks is to do the work, then
//! sleep for `P`. That loop actually runs every `P` *plus however long the work
//! took*, and the error accumulates forever.
//!
//! [`PeriodicGate`] instead keeps the absolute time of the last scheduled
//! wakeup. Each cycle it sleeps until `last_wake + period` and then advances
//! `last_wake` by exactly one period, so the schedule is a fixed lattice of
//! points `start + k * period` no matter how long the work takes or how late
//! the kernel resumes the task.

use crate::time::{Clock, Kernel, TickTime, Ticks};

/// Helper for doing something periodically, accurately.
///
/// A `PeriodicGate` can be used to *gate* (pause) execution of a task until a
/// point in time arrives; that point in time is *periodic*, meaning it repeats
/// at regular intervals. For example, to call the function `f` every 30
/// ticks, you would write:
///
/// ```ignore
/// let mut gate = PeriodicGate::new(Ticks(30), &kernel);
/// loop {
///     gate.next_time(&kernel).await;
///     f();
/// }
/// ```
///
/// This will maintain the 30-tick interval consistently, even if `f()` takes
/// several ticks to run, and even if `f()` is sometimes fast and sometimes
/// slow.
///
/// # Late wakeups
///
/// If the task is resumed after its target time (say, because higher-priority
/// work was running), the gate still advances by exactly one period. It never
/// skips ahead to "now", and it never runs a burst of cycles to make up for the
/// late one: the next target is computed from the previous *target*, not from
/// the late actual wake time. Consequently, when a task falls more than a
/// period behind, its following sleeps complete immediately until it has
/// caught up with the lattice, one cycle at a time.
///
/// Late cycles aren't errors. The gate counts them, and remembers the worst
/// lateness seen, for diagnostics; see [`PeriodicGate::stats`].
#[derive(Debug)]
pub struct PeriodicGate {
    period: Ticks,
    last_wake: TickTime,
    stats: GateStats,
}

/// Timing history of a [`PeriodicGate`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GateStats {
    /// Number of times the gate has opened.
    pub cycles: u32,
    /// Number of times the gate opened strictly after its target time.
    pub late_cycles: u32,
    /// Largest gap observed between a target time and the actual wakeup.
    pub worst_lateness: Ticks,
}

impl PeriodicGate {
    /// Creates a periodic gate that releases execution every `period`,
    /// counting from the current time on `clock`. The first release is one
    /// period from now.
    ///
    /// # Panics
    ///
    /// If `period` is zero.
    pub fn new(period: Ticks, clock: &impl Clock) -> Self {
        Self::starting_at(period, clock.now())
    }

    /// Creates a periodic gate whose lattice is anchored at `start` rather
    /// than at the current time.
    ///
    /// # Panics
    ///
    /// If `period` is zero.
    pub fn starting_at(period: Ticks, start: TickTime) -> Self {
        crate::cheap_assert!(!period.is_zero());
        PeriodicGate {
            period,
            last_wake: start,
            stats: GateStats::default(),
        }
    }

    /// Creates a periodic gate that can be used to release execution every
    /// `period`, anchored `delay` ticks in the future.
    ///
    /// This can be useful for creating multiple periodic gates that operate out
    /// of phase with respect to each other.
    pub fn new_shift(period: Ticks, delay: Ticks, clock: &impl Clock) -> Self {
        Self::starting_at(period, clock.now() + delay)
    }

    /// The fixed interval between releases.
    pub fn period(&self) -> Ticks {
        self.period
    }

    /// The most recent scheduled (not actual) wake time.
    pub fn last_wake(&self) -> TickTime {
        self.last_wake
    }

    /// The absolute time of the next release.
    pub fn deadline(&self) -> TickTime {
        self.last_wake + self.period
    }

    /// Timing history so far.
    pub fn stats(&self) -> GateStats {
        self.stats
    }

    /// Returns a future that will resolve when it's time to execute again.
    ///
    /// # Cancellation
    ///
    /// **Cancel safety:** Strict.
    ///
    /// The gate only advances after the sleep completes, so dropping this
    /// future leaves the schedule untouched.
    pub async fn next_time(&mut self, kernel: &impl Kernel) {
        kernel.sleep_until(self.deadline()).await;
        self.advance(kernel.now());
    }

    /// Moves `last_wake` forward by one period after a wakeup observed at
    /// `woke`, returning how late that wakeup was.
    fn advance(&mut self, woke: TickTime) -> Ticks {
        self.last_wake += self.period;

        let lateness = woke.saturating_ticks_since(self.last_wake);
        self.stats.cycles = self.stats.cycles.wrapping_add(1);
        if !lateness.is_zero() {
            self.stats.late_cycles = self.stats.late_cycles.wrapping_add(1);
            self.stats.worst_lateness = self.stats.worst_lateness.max(lateness);
        }
        lateness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t: u64) -> TickTime {
        TickTime::from_ticks_since_boot(t)
    }

    #[test]
    fn on_time_wakeups_are_not_late() {
        let mut gate = PeriodicGate::starting_at(Ticks(50), at(7));
        assert_eq!(gate.deadline(), at(57));

        assert_eq!(gate.advance(at(57)), Ticks::ZERO);
        assert_eq!(gate.last_wake(), at(57));
        assert_eq!(gate.deadline(), at(107));

        let stats = gate.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.late_cycles, 0);
    }

    #[test]
    fn late_wakeups_advance_by_one_period() {
        let mut gate = PeriodicGate::starting_at(Ticks(20), at(0));

        // Resumed 13 ticks after the target of 20.
        assert_eq!(gate.advance(at(33)), Ticks(13));
        assert_eq!(gate.last_wake(), at(20));

        // Resumed more than a whole period late; still only one step.
        assert_eq!(gate.advance(at(75)), Ticks(35));
        assert_eq!(gate.last_wake(), at(40));
        assert_eq!(gate.deadline(), at(60));

        let stats = gate.stats();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.late_cycles, 2);
        assert_eq!(stats.worst_lateness, Ticks(35));
    }

    #[test]
    #[should_panic]
    fn zero_period_is_rejected() {
        let _ = PeriodicGate::starting_at(Ticks::ZERO, at(0));
    }
}
