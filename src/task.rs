// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task identity.
//!
//! The application has a fixed, static set of tasks that are created at
//! startup and run until power-off. [`TaskId`] names them, and
//! [`TaskTable`] stores one value per task, indexed by identity.
//!
//! Kernels commonly let the application hang a small integer "tag" off each
//! task control block and hand it back in the context-switch hooks.
//! [`TaskId::tag`] and [`TaskId::from_tag`] convert between the two; tag `0` is
//! reserved for the kernel's idle task.

use core::ops::{Index, IndexMut};

/// Identity of one of the application's tasks, or of the kernel's idle task.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskId {
    /// The kernel's idle task. Time spent here is not busy time.
    Idle = 0,
    /// Edge monitor for the first button.
    Button1 = 1,
    /// Edge monitor for the second button.
    Button2 = 2,
    /// Emits a fixed status message every period.
    PeriodicTransmitter = 3,
    /// Drains the message queue into the serial port.
    UartReceiver = 4,
    /// First synthetic CPU load.
    Load1 = 5,
    /// Second synthetic CPU load.
    Load2 = 6,
}

impl TaskId {
    /// Number of identities, including `Idle`.
    pub const COUNT: usize = 7;

    /// Every identity, in tag order.
    pub const ALL: [TaskId; Self::COUNT] = [
        TaskId::Idle,
        TaskId::Button1,
        TaskId::Button2,
        TaskId::PeriodicTransmitter,
        TaskId::UartReceiver,
        TaskId::Load1,
        TaskId::Load2,
    ];

    /// Maps a raw kernel task tag back to an identity. Unknown tags produce
    /// `None`.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }

    /// The raw tag to attach to this task's control block.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Checks whether this is the reserved idle identity.
    pub const fn is_idle(self) -> bool {
        matches!(self, TaskId::Idle)
    }

    /// Iterates over the identities the profiler attributes busy time to,
    /// which is all of them except `Idle`.
    pub fn tracked() -> impl Iterator<Item = TaskId> {
        Self::ALL.into_iter().filter(|t| !t.is_idle())
    }

    /// Short human-readable name, fit for a kernel's task name field.
    pub const fn name(self) -> &'static str {
        match self {
            TaskId::Idle => "Idle",
            TaskId::Button1 => "Button_1_Monitor",
            TaskId::Button2 => "Button_2_Monitor",
            TaskId::PeriodicTransmitter => "Periodic_Transmitter",
            TaskId::UartReceiver => "Uart_Receiver",
            TaskId::Load1 => "Load_1_Simulation",
            TaskId::Load2 => "Load_2_Simulation",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// One `T` per task identity, `Idle` included.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct TaskTable<T> {
    slots: [T; TaskId::COUNT],
}

impl<T> TaskTable<T> {
    /// Creates a table from one value per identity, in tag order.
    pub const fn from_array(slots: [T; TaskId::COUNT]) -> Self {
        Self { slots }
    }

    /// Iterates over `(identity, value)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &T)> {
        TaskId::ALL.into_iter().zip(self.slots.iter())
    }
}

impl<T: Copy> TaskTable<T> {
    /// Creates a table with every slot set to `value`.
    pub const fn splat(value: T) -> Self {
        Self { slots: [value; TaskId::COUNT] }
    }
}

impl<T> Index<TaskId> for TaskTable<T> {
    type Output = T;

    fn index(&self, id: TaskId) -> &T {
        &self.slots[id.index()]
    }
}

impl<T> IndexMut<TaskId> for TaskTable<T> {
    fn index_mut(&mut self, id: TaskId) -> &mut T {
        &mut self.slots[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_the_lookup_table() {
        for id in TaskId::ALL {
            assert_eq!(TaskId::from_tag(id.tag()), Some(id));
        }
        assert_eq!(TaskId::from_tag(0), Some(TaskId::Idle));
        assert_eq!(TaskId::from_tag(7), None);
        assert_eq!(TaskId::from_tag(u8::MAX), None);
    }

    #[test]
    fn idle_is_not_tracked() {
        assert_eq!(TaskId::tracked().count(), TaskId::COUNT - 1);
        assert!(TaskId::tracked().all(|t| !t.is_idle()));
    }

    #[test]
    fn table_indexing_is_per_identity() {
        let mut table = TaskTable::splat(0u32);
        table[TaskId::Button2] += 3;
        table[TaskId::Load1] = 9;

        assert_eq!(table[TaskId::Button2], 3);
        assert_eq!(table[TaskId::Load1], 9);
        assert_eq!(table[TaskId::Button1], 0);

        let total: u32 = table.iter().map(|(_, v)| *v).sum();
        assert_eq!(total, 12);
    }
}
