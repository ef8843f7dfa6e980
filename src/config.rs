// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static system configuration.
//!
//! Everything here is fixed before the scheduler starts. The configuration is
//! checked once, by [`System::new`][crate::system::System::new]; a bad
//! configuration stops startup rather than producing a half-working system.

use core::fmt;

use crate::hal::Level;
use crate::task::TaskId;
use crate::time::Ticks;

/// Kernel tick frequency. Periods below are in ticks, so at this rate, in
/// milliseconds.
pub const TICK_RATE_HZ: u32 = 1000;

/// Number of messages the status queue can hold. Enough to absorb one edge
/// from each button plus a periodic message before the receiver runs.
pub const QUEUE_CAPACITY: usize = 3;

/// Settings for one button monitor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonConfig {
    /// Sampling period.
    pub period: Ticks,
    /// Level assumed before the first sample. A first sample at a different
    /// level counts as an edge.
    pub initial: Level,
}

/// Settings for a synthetic CPU load task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadConfig {
    /// Activation period.
    pub period: Ticks,
    /// How long each activation keeps the CPU busy. Must be shorter than
    /// `period`.
    pub busy: Ticks,
}

/// Everything about the application that is decided at build time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemConfig {
    /// First button monitor.
    pub button1: ButtonConfig,
    /// Second button monitor.
    pub button2: ButtonConfig,
    /// Period of the fixed status message.
    pub transmitter_period: Ticks,
    /// Period at which the receiver drains one message.
    pub receiver_period: Ticks,
    /// First synthetic load, if any.
    pub load1: Option<LoadConfig>,
    /// Second synthetic load, if any.
    pub load2: Option<LoadConfig>,
}

impl SystemConfig {
    /// The reference configuration: buttons sampled every 50 ticks starting
    /// from High, a status message every 100, the receiver every 20, and no
    /// synthetic load.
    pub const DEFAULT: Self = Self {
        button1: ButtonConfig {
            period: Ticks(50),
            initial: Level::High,
        },
        button2: ButtonConfig {
            period: Ticks(50),
            initial: Level::High,
        },
        transmitter_period: Ticks(100),
        receiver_period: Ticks(20),
        load1: None,
        load2: None,
    };

    /// Period of the given task, or `None` for `Idle` and for disabled load
    /// tasks.
    pub fn period_of(&self, task: TaskId) -> Option<Ticks> {
        match task {
            TaskId::Idle => None,
            TaskId::Button1 => Some(self.button1.period),
            TaskId::Button2 => Some(self.button2.period),
            TaskId::PeriodicTransmitter => Some(self.transmitter_period),
            TaskId::UartReceiver => Some(self.receiver_period),
            TaskId::Load1 => self.load1.map(|l| l.period),
            TaskId::Load2 => self.load2.map(|l| l.period),
        }
    }

    /// Load settings for a load task identity, if enabled.
    pub fn load_of(&self, task: TaskId) -> Option<LoadConfig> {
        match task {
            TaskId::Load1 => self.load1,
            TaskId::Load2 => self.load2,
            _ => None,
        }
    }

    /// Checks the configuration for values that can't work.
    ///
    /// Every enabled task needs a nonzero period, and a load task must leave
    /// some of its period idle.
    pub fn validate(&self) -> Result<(), StartupError> {
        for task in TaskId::tracked() {
            if let Some(period) = self.period_of(task) {
                if period.is_zero() {
                    return Err(StartupError::ZeroPeriod(task));
                }
            }
            if let Some(load) = self.load_of(task) {
                if load.busy >= load.period {
                    return Err(StartupError::LoadExceedsPeriod {
                        task,
                        busy: load.busy,
                        period: load.period,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Reasons the system refuses to start.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupError {
    /// The task was configured with a period of zero ticks.
    ZeroPeriod(TaskId),
    /// A load task would be busy for its entire period or longer.
    LoadExceedsPeriod {
        /// The load task.
        task: TaskId,
        /// Configured busy time.
        busy: Ticks,
        /// Configured period.
        period: Ticks,
    },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::ZeroPeriod(task) => {
                write!(f, "{} has a zero period", task.name())
            }
            StartupError::LoadExceedsPeriod { task, busy, period } => write!(
                f,
                "{} is busy for {} of its {} ticks",
                task.name(), busy.0, period.0,
            ),
        }
    }
}
