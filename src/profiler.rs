// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run-time profiling from the kernel's context-switch hooks.
//!
//! The kernel calls [`Profiler::on_switch_out`] for the task it is about to
//! stop running, then [`Profiler::on_switch_in`] for the task it is about to
//! start, once each per context switch. From that trace the profiler keeps,
//! per task, the last switch-in and switch-out timestamps and the total time
//! spent running; and, globally, the total busy time of all application tasks
//! and the time of the most recent switch.
//!
//! These hooks run on the kernel's switch path with interrupts effectively
//! off. They take constant time, never allocate, and never wait for anything
//! except the (uncontended, interrupts-off) critical section.
//!
//! # Utilization
//!
//! Busy time is accumulated in integer ticks, so the running total is exact.
//! At every switch-out the profiler stores a fresh [`Utilization`] snapshot,
//! the pair `(aggregate busy, now)`; the ratio is computed from that pair
//! when someone asks for it, never updated incrementally.
//!
//! The denominator is the time since boot, not a rolling window. Over a long
//! uptime the figure becomes a lifetime average that reacts more and more
//! slowly to recent load. Take two snapshots and use
//! [`Utilization::since`] if you want the load over an interval.
//!
//! # The idle task
//!
//! Switches into and out of [`TaskId::Idle`] touch no busy-time counters. They
//! still update the time of the most recent switch, and still reach the
//! [`TraceProbe`], so an idle indicator line works like any other.
//!
//! # When the trace doesn't make sense
//!
//! A switch hook has nobody to return an error to. Instead, anything that
//! indicates a broken kernel integration or a broken profiler is recorded in
//! a [`Health`] block for a health check to inspect, and logged at error
//! level. No value is ever clamped to hide the problem:
//!
//! - a switch-out with no matching switch-in counts zero busy time
//!   ([`Anomaly::UnpairedSwitchOut`]);
//! - a timestamp that goes backwards counts zero busy time
//!   ([`Anomaly::ClockRegression`]);
//! - a second switch-in without a switch-out restarts the interval
//!   ([`Anomaly::DoubleSwitchIn`]);
//! - total busy time exceeding elapsed time is reported as-is
//!   ([`Anomaly::OverUtilization`]);
//! - a raw tag that names no task still advances the switch time, and a
//!   switch-out still refreshes the snapshot ([`Anomaly::UnknownTag`]).
//!
//! One event produces at most one clock-regression record, even when its
//! timestamp is behind both the last switch and the task's switch-in.

use core::cell::RefCell;
use core::fmt;
use core::mem;

use critical_section::Mutex;

use crate::hal::{Level, TraceLines};
use crate::task::{TaskId, TaskTable};
use crate::time::{TickTime, Ticks};

/// Observer of context switches, called from inside the switch hooks.
///
/// The typical use is to drive a GPIO line per task so that a logic analyzer
/// shows the schedule. Implementations run with interrupts off and must be
/// quick.
pub trait TraceProbe {
    /// `task` is about to start running.
    fn switched_in(&mut self, task: TaskId) {
        let _ = task;
    }

    /// `task` has stopped running.
    fn switched_out(&mut self, task: TaskId) {
        let _ = task;
    }
}

/// No probe at all.
impl TraceProbe for () {}

/// Probe that raises a task's trace line while it runs and lowers it when it
/// stops.
#[derive(Debug, Default)]
pub struct LineProbe<L>(pub L);

impl<L: TraceLines> TraceProbe for LineProbe<L> {
    fn switched_in(&mut self, task: TaskId) {
        self.0.set(task, Level::High);
    }

    fn switched_out(&mut self, task: TaskId) {
        self.0.set(task, Level::Low);
    }
}

/// What the profiler knows about one task.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskRecord {
    entry: TickTime,
    exit: TickTime,
    busy: Ticks,
    activations: u32,
    running: bool,
}

impl TaskRecord {
    const NEW: Self = Self {
        entry: TickTime::BOOT,
        exit: TickTime::BOOT,
        busy: Ticks::ZERO,
        activations: 0,
        running: false,
    };

    /// Time of the most recent switch-in.
    pub fn entry(&self) -> TickTime {
        self.entry
    }

    /// Time of the most recent switch-out.
    pub fn exit(&self) -> TickTime {
        self.exit
    }

    /// Total time this task has spent running.
    pub fn busy(&self) -> Ticks {
        self.busy
    }

    /// Number of times this task has been switched in.
    pub fn activations(&self) -> u32 {
        self.activations
    }

    /// Checks whether the task is between a switch-in and its switch-out.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// A utilization snapshot: total busy time against elapsed time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Utilization {
    /// Sum of busy time over all application tasks.
    pub busy: Ticks,
    /// Time of the switch at which the snapshot was taken. Because the clock
    /// counts from boot, this is also the elapsed time.
    ///
    /// In a snapshot derived by [`Utilization::since`], this is instead the
    /// length of the interval, expressed as if the interval began at boot.
    pub elapsed: TickTime,
}

impl Utilization {
    /// Utilization in hundredths of a percent, or `None` if no time has
    /// elapsed.
    ///
    /// Values above 10 000 are possible and mean the profiler has been fed an
    /// inconsistent trace; see [`Utilization::is_plausible`].
    pub fn basis_points(&self) -> Option<u64> {
        let elapsed = self.elapsed.ticks_since_boot();
        if elapsed == 0 {
            return None;
        }
        let bp = u128::from(self.busy.0) * 10_000 / u128::from(elapsed);
        Some(u64::try_from(bp).unwrap_or(u64::MAX))
    }

    /// Utilization as a percentage, `0.0` if no time has elapsed.
    pub fn percent(&self) -> f32 {
        let elapsed = self.elapsed.ticks_since_boot();
        if elapsed == 0 {
            0.0
        } else {
            self.busy.0 as f32 / elapsed as f32 * 100.0
        }
    }

    /// Checks the basic accounting invariant: busy time can't exceed wall
    /// time.
    pub fn is_plausible(&self) -> bool {
        self.busy.0 <= self.elapsed.ticks_since_boot()
    }

    /// Utilization over the interval between an `earlier` snapshot and this
    /// one.
    ///
    /// The result describes the interval alone: `busy` is the busy time
    /// accrued between the two snapshots, and `elapsed` is the span between
    /// them rather than a point in time. Use its ratios, or compare it with
    /// other derived snapshots; don't mix it with live ones.
    ///
    /// Returns `None` if `earlier` is actually later.
    pub fn since(&self, earlier: Utilization) -> Option<Utilization> {
        let span = self.elapsed.checked_ticks_since(earlier.elapsed)?;
        let busy = self.busy.0.checked_sub(earlier.busy.0)?;
        Some(Utilization {
            busy: Ticks(busy),
            elapsed: TickTime::from_ticks_since_boot(span.0),
        })
    }
}

/// Something in the switch trace that can't happen if the kernel and the
/// profiler are both correct.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Anomaly {
    /// A task was switched out without having been switched in.
    UnpairedSwitchOut {
        /// Task being switched out.
        task: TaskId,
        /// Time of the switch-out.
        at: TickTime,
    },
    /// A timestamp was earlier than one already recorded.
    ClockRegression {
        /// Task being switched.
        task: TaskId,
        /// The later, previously recorded time.
        previous: TickTime,
        /// The earlier time just reported.
        now: TickTime,
    },
    /// The kernel reported a switch for a tag that names no task.
    UnknownTag {
        /// The raw tag.
        tag: u8,
        /// Time of the switch.
        at: TickTime,
    },
    /// A task was switched in while already running.
    DoubleSwitchIn {
        /// Task being switched in.
        task: TaskId,
        /// Time of the second switch-in.
        at: TickTime,
    },
    /// Total busy time exceeds elapsed time.
    OverUtilization {
        /// The offending snapshot.
        snapshot: Utilization,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::UnpairedSwitchOut { task, at } => write!(
                f,
                "{} switched out at {} without a switch-in",
                task.name(), at.ticks_since_boot(),
            ),
            Anomaly::ClockRegression { task, previous, now } => write!(
                f,
                "clock went backwards switching {}: {} after {}",
                task.name(), now.ticks_since_boot(), previous.ticks_since_boot(),
            ),
            Anomaly::UnknownTag { tag, at } => write!(
                f,
                "switch at {} for unknown task tag {}",
                at.ticks_since_boot(), tag,
            ),
            Anomaly::DoubleSwitchIn { task, at } => write!(
                f,
                "{} switched in at {} while already running",
                task.name(), at.ticks_since_boot(),
            ),
            Anomaly::OverUtilization { snapshot } => write!(
                f,
                "busy time {} exceeds elapsed time {}",
                snapshot.busy.0, snapshot.elapsed.ticks_since_boot(),
            ),
        }
    }
}

/// Anomaly counters, for an external health check.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Health {
    /// Count of [`Anomaly::UnpairedSwitchOut`].
    pub unpaired_switch_outs: u32,
    /// Count of [`Anomaly::ClockRegression`].
    pub clock_regressions: u32,
    /// Count of [`Anomaly::UnknownTag`].
    pub unknown_tags: u32,
    /// Count of [`Anomaly::DoubleSwitchIn`].
    pub double_switch_ins: u32,
    /// Count of [`Anomaly::OverUtilization`].
    pub over_utilizations: u32,
    /// The most recent anomaly of any kind.
    pub last: Option<Anomaly>,
}

impl Health {
    const NEW: Self = Self {
        unpaired_switch_outs: 0,
        clock_regressions: 0,
        unknown_tags: 0,
        double_switch_ins: 0,
        over_utilizations: 0,
        last: None,
    };

    /// Checks that no anomaly has ever been recorded.
    pub fn is_ok(&self) -> bool {
        self.last.is_none()
    }

    /// Total number of anomalies recorded.
    pub fn total(&self) -> u32 {
        self.unpaired_switch_outs
            .wrapping_add(self.clock_regressions)
            .wrapping_add(self.unknown_tags)
            .wrapping_add(self.double_switch_ins)
            .wrapping_add(self.over_utilizations)
    }

    fn record(&mut self, anomaly: Anomaly) {
        let counter = match anomaly {
            Anomaly::UnpairedSwitchOut { .. } => &mut self.unpaired_switch_outs,
            Anomaly::ClockRegression { .. } => &mut self.clock_regressions,
            Anomaly::UnknownTag { .. } => &mut self.unknown_tags,
            Anomaly::DoubleSwitchIn { .. } => &mut self.double_switch_ins,
            Anomaly::OverUtilization { .. } => &mut self.over_utilizations,
        };
        *counter = counter.wrapping_add(1);
        self.last = Some(anomaly);
        log_error!("profiler anomaly: {:?}", anomaly);
    }
}

/// Everything the profiler knows, copied out in one critical section.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProfileReport {
    /// Per-task records. The `Idle` slot never accumulates anything.
    pub tasks: TaskTable<TaskRecord>,
    /// Snapshot from the most recent switch-out.
    pub utilization: Utilization,
    /// Anomaly counters.
    pub health: Health,
}

/// Execution-time profiler fed by the kernel's context-switch hooks.
///
/// See the module docs for details.
pub struct Profiler<P = ()> {
    state: Mutex<RefCell<State<P>>>,
}

struct State<P> {
    tasks: TaskTable<TaskRecord>,
    aggregate_busy: Ticks,
    last_switch: TickTime,
    snapshot: Utilization,
    health: Health,
    probe: P,
}

impl<P: TraceProbe> Profiler<P> {
    /// Creates a profiler that has seen no switches, reporting to `probe`.
    pub const fn new(probe: P) -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                tasks: TaskTable::splat(TaskRecord::NEW),
                aggregate_busy: Ticks::ZERO,
                last_switch: TickTime::BOOT,
                snapshot: Utilization {
                    busy: Ticks::ZERO,
                    elapsed: TickTime::BOOT,
                },
                health: Health::NEW,
                probe,
            })),
        }
    }

    /// Switch-out hook: `task` stops running at `now`.
    ///
    /// Attributes the time since `task`'s switch-in to it, and refreshes the
    /// utilization snapshot.
    pub fn on_switch_out(&self, task: TaskId, now: TickTime) {
        self.with_state(|s| s.switch_out(task, now))
    }

    /// Switch-in hook: `task` starts running at `now`.
    pub fn on_switch_in(&self, task: TaskId, now: TickTime) {
        self.with_state(|s| s.switch_in(task, now))
    }

    /// Convenience for kernels that carry raw task tags: looks up the
    /// identity and calls [`Profiler::on_switch_out`].
    ///
    /// An unknown tag is recorded as [`Anomaly::UnknownTag`]. The switch
    /// time still advances and the utilization snapshot is still refreshed,
    /// but no task is charged. Returns `false` in that case.
    pub fn on_switch_out_tagged(&self, tag: u8, now: TickTime) -> bool {
        match TaskId::from_tag(tag) {
            Some(task) => {
                self.on_switch_out(task, now);
                true
            }
            None => {
                self.with_state(|s| s.unknown_switch(tag, now, true));
                false
            }
        }
    }

    /// Tag-based twin of [`Profiler::on_switch_in`]. An unknown tag is
    /// recorded and advances the switch time.
    pub fn on_switch_in_tagged(&self, tag: u8, now: TickTime) -> bool {
        match TaskId::from_tag(tag) {
            Some(task) => {
                self.on_switch_in(task, now);
                true
            }
            None => {
                self.with_state(|s| s.unknown_switch(tag, now, false));
                false
            }
        }
    }

    /// The snapshot taken at the most recent switch-out.
    pub fn utilization(&self) -> Utilization {
        self.with_state(|s| s.snapshot)
    }

    /// Total busy time of one task.
    pub fn busy_time(&self, task: TaskId) -> Ticks {
        self.with_state(|s| s.tasks[task].busy)
    }

    /// Copy of one task's record.
    pub fn record(&self, task: TaskId) -> TaskRecord {
        self.with_state(|s| s.tasks[task])
    }

    /// Time of the most recent switch of any kind.
    pub fn last_switch(&self) -> TickTime {
        self.with_state(|s| s.last_switch)
    }

    /// Anomaly counters.
    pub fn health(&self) -> Health {
        self.with_state(|s| s.health)
    }

    /// Copies out all records, the snapshot and the health block at once, so
    /// they are mutually consistent.
    pub fn report(&self) -> ProfileReport {
        self.with_state(|s| ProfileReport {
            tasks: s.tasks,
            utilization: s.snapshot,
            health: s.health,
        })
    }

    /// Runs `op` with access to the probe.
    pub fn with_probe<R>(&self, op: impl FnOnce(&mut P) -> R) -> R {
        self.with_state(|s| op(&mut s.probe))
    }

    fn with_state<R>(&self, op: impl FnOnce(&mut State<P>) -> R) -> R {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            op(&mut *state)
        })
    }
}

impl<P: TraceProbe + Default> Default for Profiler<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

impl<P: TraceProbe> fmt::Debug for Profiler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("report", &self.report())
            .finish()
    }
}

impl<P: TraceProbe> State<P> {
    fn switch_out(&mut self, task: TaskId, now: TickTime) {
        self.probe.switched_out(task);

        let regressed = match self.note_switch_time(task, now) {
            Ok(()) => false,
            Err(a) => {
                self.health.record(a);
                true
            }
        };
        match self.attribute(task, now) {
            Err(Anomaly::ClockRegression { .. }) if regressed => (),
            Err(a) => self.health.record(a),
            Ok(_) => (),
        }

        self.refresh_snapshot(now);
    }

    /// Switch for a tag that maps to no task. Nobody is charged, but time
    /// still moves.
    fn unknown_switch(&mut self, tag: u8, now: TickTime, out: bool) {
        self.health.record(Anomaly::UnknownTag { tag, at: now });
        let previous = mem::replace(&mut self.last_switch, now);
        if now < previous {
            log_warn!("unknown tag {} also regressed the clock", tag);
        }
        if out {
            self.refresh_snapshot(now);
        }
    }

    fn refresh_snapshot(&mut self, now: TickTime) {
        self.snapshot = Utilization {
            busy: self.aggregate_busy,
            elapsed: now,
        };
        if !self.snapshot.is_plausible() {
            self.health.record(Anomaly::OverUtilization {
                snapshot: self.snapshot,
            });
        }
    }

    fn switch_in(&mut self, task: TaskId, now: TickTime) {
        self.probe.switched_in(task);

        if let Err(a) = self.note_switch_time(task, now) {
            self.health.record(a);
        }
        if task.is_idle() {
            return;
        }

        let record = &mut self.tasks[task];
        let already_running = mem::replace(&mut record.running, true);
        record.entry = now;
        record.activations = record.activations.wrapping_add(1);

        if already_running {
            self.health.record(Anomaly::DoubleSwitchIn { task, at: now });
        }
    }

    /// Advances the most-recent-switch time.
    fn note_switch_time(&mut self, task: TaskId, now: TickTime) -> Result<(), Anomaly> {
        let previous = mem::replace(&mut self.last_switch, now);
        if now < previous {
            Err(Anomaly::ClockRegression { task, previous, now })
        } else {
            Ok(())
        }
    }

    /// Charges the interval since `task`'s switch-in to `task`, returning the
    /// amount charged.
    fn attribute(&mut self, task: TaskId, now: TickTime) -> Result<Ticks, Anomaly> {
        if task.is_idle() {
            return Ok(Ticks::ZERO);
        }

        let record = &mut self.tasks[task];
        record.exit = now;
        if !mem::replace(&mut record.running, false) {
            return Err(Anomaly::UnpairedSwitchOut { task, at: now });
        }
        let delta = now.checked_ticks_since(record.entry).ok_or(
            Anomaly::ClockRegression { task, previous: record.entry, now },
        )?;

        record.busy += delta;
        self.aggregate_busy += delta;
        Ok(delta)
    }
}
