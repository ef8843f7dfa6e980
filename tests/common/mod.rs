// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated kernel and fake peripherals for driving the crate on the host.
//!
//! Time only moves when a test says so. Futures are polled by hand with a
//! no-op waker; since `SimKernel`'s sleeps resolve purely by comparing against
//! the simulated clock, re-polling after each advance is all the waking they
//! need.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;

use rtmon::hal::{Level, SerialSink, TraceLines};
use rtmon::task::TaskId;
use rtmon::time::{Clock, Kernel, TickTime};

/// A clock under test control, plus a sleep that consults it.
#[derive(Debug, Default)]
pub struct SimKernel {
    now: Cell<u64>,
    /// Amount the clock advances by after each `now()` read, for code that
    /// spins on the clock.
    read_step: Cell<u64>,
    /// Every deadline anyone has slept on, in order.
    sleeps: RefCell<Vec<TickTime>>,
}

impl SimKernel {
    pub fn starting_at(t: u64) -> Self {
        let k = Self::default();
        k.now.set(t);
        k
    }

    /// A clock that ticks forward by `step` every time it's read.
    pub fn self_advancing(step: u64) -> Self {
        let k = Self::default();
        k.read_step.set(step);
        k
    }

    pub fn peek(&self) -> TickTime {
        TickTime::from_ticks_since_boot(self.now.get())
    }

    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get() + ticks);
    }

    pub fn set(&self, t: u64) {
        self.now.set(t);
    }

    pub fn sleeps(&self) -> Vec<TickTime> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for SimKernel {
    fn now(&self) -> TickTime {
        let t = self.now.get();
        self.now.set(t + self.read_step.get());
        TickTime::from_ticks_since_boot(t)
    }
}

impl Kernel for SimKernel {
    fn sleep_until(&self, deadline: TickTime) -> impl Future<Output = ()> {
        self.sleeps.borrow_mut().push(deadline);
        futures::future::poll_fn(move |_| {
            if self.peek() >= deadline {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
    }
}

/// Polls `fut` once.
pub fn poll_once<F: Future + ?Sized>(fut: Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(noop_waker_ref());
    fut.poll(&mut cx)
}

/// Polls a never-ending task at every tick from the current time up to and
/// including `until`.
pub fn run_until<F>(kernel: &SimKernel, mut fut: Pin<&mut F>, until: u64)
where
    F: Future<Output = Infallible> + ?Sized,
{
    loop {
        if let Poll::Ready(never) = poll_once(fut.as_mut()) {
            match never {}
        }
        if kernel.peek().ticks_since_boot() >= until {
            break;
        }
        kernel.advance(1);
    }
}

/// Serial port that remembers everything written to it.
#[derive(Debug, Default)]
pub struct Uart {
    bytes: RefCell<Vec<u8>>,
}

impl Uart {
    pub fn text(&self) -> String {
        String::from_utf8(self.bytes.borrow().clone()).unwrap()
    }

    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }
}

impl SerialSink for &Uart {
    fn put_char(&mut self, byte: u8) {
        self.bytes.borrow_mut().push(byte);
    }
}

/// A digital input played back from a list of samples. Once the list runs
/// out, the last sample repeats.
pub fn scripted(samples: &[u8]) -> impl FnMut() -> Level {
    let samples = samples.to_vec();
    let mut i = 0;
    move || {
        let s = samples[i.min(samples.len() - 1)];
        i += 1;
        Level::from(s != 0)
    }
}

/// Trace lines that log every change.
#[derive(Debug, Default)]
pub struct LineLog {
    pub changes: Vec<(TaskId, Level)>,
}

impl TraceLines for LineLog {
    fn set(&mut self, task: TaskId, level: Level) {
        self.changes.push((task, level));
    }
}

pub fn at(t: u64) -> TickTime {
    TickTime::from_ticks_since_boot(t)
}
