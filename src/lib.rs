// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task timing, status messaging, and run-time profiling for a small
//! monitoring application running under a preemptive real-time kernel.
//!
//! The kernel itself (scheduler, context switching, interrupt setup) and the
//! board drivers (GPIO, UART) live elsewhere. This crate provides the parts of
//! the application that have real timing and concurrency semantics:
//!
//! 1. A drift-free periodic execution pattern, [`periodic::PeriodicGate`].
//!    Each task captures its start time once, then repeatedly sleeps until an
//!    *absolute* deadline and advances that deadline by exactly one period.
//!
//! 2. A bounded multi-producer, single-consumer message queue,
//!    [`queue::Queue`], carrying `&'static str` status messages from the
//!    monitor tasks to the output task. Both ends are non-blocking: a full
//!    queue rejects the message, an empty queue yields nothing.
//!
//! 3. A run-time profiler, [`profiler::Profiler`], called by the kernel on
//!    every context switch. It attributes elapsed time to the task being
//!    switched out and keeps an aggregate processor utilization figure.
//!
//! On top of these, [`monitor`] holds the application tasks: two button edge
//! detectors, a periodic transmitter, and a receiver that forwards messages to
//! a serial port.
//!
//! # Talking to the kernel
//!
//! The crate doesn't know which kernel it runs under. It asks for two things,
//! expressed as traits in [`time`]:
//!
//! - a monotonic tick counter ([`time::Clock`]), and
//! - a way to suspend the calling task until an absolute tick
//!   ([`time::Kernel::sleep_until`]).
//!
//! Task bodies are `async fn`s that never return, so they can be handed to any
//! executor that can drive a `Future` -- one executor task per application
//! task, or all of them joined together with [`monitor::run_all`].
//!
//! The kernel is also expected to call [`profiler::Profiler::on_switch_out`]
//! and [`profiler::Profiler::on_switch_in`], in that order, exactly once each
//! per context switch.
//!
//! # Shared state
//!
//! There is exactly one queue and one profiler per system. Rather than hiding
//! them in statics, they're owned by a [`system::System`] value that the
//! application creates at startup, and borrowed out to the tasks and the
//! switch hook. Both are guarded by a `critical-section` lock, which on a
//! single-core Cortex-M means "interrupts off."
//!
//! # Features
//!
//! - `systick`: provides [`time::systick`], a 1 kHz tick counter driven by the
//!   Cortex-M SysTick timer, plus a polling [`time::Kernel`] built on it. This
//!   also selects `cortex-m`'s single-core `critical-section` implementation.
//! - `defmt`: routes the crate's log output through `defmt`.

#![cfg_attr(not(test), no_std)]

#![warn(
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    missing_debug_implementations,
    missing_docs,
    semicolon_in_expressions_from_macros,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused_qualifications,
)]

/// Internal assert macro that doesn't stringify its expression or generate any
/// fancy messages. This means failures must be diagnosed by file:line only, so,
/// don't use this more than once on the same line. In exchange, this makes
/// asserts significantly smaller in terms of text size.
macro_rules! cheap_assert {
    ($x:expr) => {
        if !$x { panic!(); };
    }
}
pub(crate) use cheap_assert;

#[macro_use]
mod log;

pub mod config;
pub mod hal;
pub mod monitor;
pub mod periodic;
pub mod profiler;
pub mod queue;
pub mod system;
pub mod task;
pub mod time;
