// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timekeeping using the Cortex-M SysTick Timer.
//!
//! **Note:** this entire module is only available if the `systick` feature is
//! present.
//!
//! The SysTick Timer maintains a monotonic counter recording the number of
//! ticks since boot, at [`TICK_RATE_HZ`][crate::config::TICK_RATE_HZ]. To use
//! it, call [`initialize_sys_tick`] once at startup to inform it of the core
//! clock speed. Otherwise, the counter won't advance.
//!
//! [`SysTickClock`] reads the counter. It also implements
//! [`Kernel`][super::Kernel] in the simplest possible way: a sleeping future
//! re-checks the clock every time it's polled and asks to be polled again if
//! the deadline hasn't passed. That's adequate for bring-up and for
//! executors that idle between polls; a real kernel will want to park the task
//! on a timer list instead.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::{Context, Poll};

use cortex_m::peripheral::{syst::SystClkSource, SYST};
use cortex_m_rt::exception;

use super::{Clock, Kernel, TickTime};
use crate::config::TICK_RATE_HZ;

/// Bottom 32 bits of the tick counter. Updated by ISR.
static TICK: AtomicU32 = AtomicU32::new(0);
/// Top 32 bits of the tick counter. Updated by ISR.
static EPOCH: AtomicU32 = AtomicU32::new(0);

/// Sets up the tick counter for `TICK_RATE_HZ` operation, assuming a CPU core
/// clock of `clock_hz`.
pub fn initialize_sys_tick(syst: &mut SYST, clock_hz: u32) {
    let cycles_per_tick = clock_hz / TICK_RATE_HZ;
    syst.set_reload(cycles_per_tick - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_interrupt();
    syst.enable_counter();
}

/// Reads the SysTick-driven tick counter.
#[derive(Copy, Clone, Debug, Default)]
pub struct SysTickClock;

impl Clock for SysTickClock {
    fn now(&self) -> TickTime {
        // This loop will only repeat if e != e2, which means we raced the
        // systick ISR. Since that ISR only occurs once per tick, this loop
        // should repeat at most twice.
        loop {
            let e = EPOCH.load(Ordering::Acquire);
            let t = TICK.load(Ordering::Acquire);
            let e2 = EPOCH.load(Ordering::Acquire);
            if e == e2 {
                break TickTime::from_ticks_since_boot(((e as u64) << 32) | (t as u64));
            }
        }
    }
}

impl Kernel for SysTickClock {
    fn sleep_until(&self, deadline: TickTime) -> impl Future<Output = ()> {
        SpinUntil { clock: *self, deadline }
    }
}

/// Future that resolves once the clock passes `deadline`, requesting a
/// re-poll every time it comes up short.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
struct SpinUntil {
    clock: SysTickClock,
    deadline: TickTime,
}

impl Future for SpinUntil {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.clock.now() >= self.deadline {
            Poll::Ready(())
        } else {
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// System tick ISR. Advances the tick counter.
///
/// This is the only writer of `TICK` and `EPOCH`, so plain load/store pairs
/// are enough, and work on ARMv6-M parts without atomic read-modify-write.
#[doc(hidden)]
#[exception]
fn SysTick() {
    let t = TICK.load(Ordering::Relaxed).wrapping_add(1);
    TICK.store(t, Ordering::Release);
    if t == 0 {
        let e = EPOCH.load(Ordering::Relaxed).wrapping_add(1);
        EPOCH.store(e, Ordering::Release);
    }
}
