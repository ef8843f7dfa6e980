// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces to the board's pins and serial port.
//!
//! The register-level drivers belong to the board support code. The
//! application only needs to poll a couple of input lines, push characters at
//! a serial port, and (optionally) wiggle one trace line per task so a logic
//! analyzer can show what's running.

use crate::task::TaskId;

/// Logic level of a digital line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Line reads 0.
    Low,
    /// Line reads 1.
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

/// A polled digital input, such as a button.
pub trait DigitalInput {
    /// Samples the line.
    fn read(&mut self) -> Level;
}

impl<F: FnMut() -> Level> DigitalInput for F {
    fn read(&mut self) -> Level {
        self()
    }
}

/// A byte-at-a-time output, such as a UART transmitter.
///
/// Implementations may block until the byte is accepted or drop it if the
/// hardware is busy; the caller doesn't care which.
pub trait SerialSink {
    /// Transmits one byte.
    fn put_char(&mut self, byte: u8);
}

impl<S: SerialSink + ?Sized> SerialSink for &mut S {
    fn put_char(&mut self, byte: u8) {
        (**self).put_char(byte)
    }
}

/// A bank of trace outputs with one line per task identity, the idle task
/// included.
pub trait TraceLines {
    /// Drives the line belonging to `task`.
    fn set(&mut self, task: TaskId, level: Level);
}
