// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::pin::pin;
use std::task::Poll;

use common::{at, poll_once, SimKernel};
use rtmon::periodic::PeriodicGate;
use rtmon::time::Ticks;

#[test]
fn gate_waits_for_absolute_deadline() {
    let kernel = SimKernel::starting_at(5);
    let mut gate = PeriodicGate::new(Ticks(10), &kernel);
    assert_eq!(gate.deadline(), at(15));

    {
        let mut wait = pin!(gate.next_time(&kernel));
        assert_eq!(poll_once(wait.as_mut()), Poll::Pending);
        kernel.set(14);
        assert_eq!(poll_once(wait.as_mut()), Poll::Pending);
        kernel.set(15);
        assert_eq!(poll_once(wait.as_mut()), Poll::Ready(()));
    }
    assert_eq!(gate.last_wake(), at(15));
    assert_eq!(gate.stats().late_cycles, 0);
}

#[test]
fn late_wakeup_catches_up_one_period_at_a_time() {
    let kernel = SimKernel::starting_at(0);
    let mut gate = PeriodicGate::new(Ticks(10), &kernel);

    // Resumed at 27 for a target of 10.
    kernel.set(27);
    assert_eq!(poll_once(pin!(gate.next_time(&kernel))), Poll::Ready(()));
    assert_eq!(gate.last_wake(), at(10));

    // Targets 20 is already past, so it releases at once...
    assert_eq!(poll_once(pin!(gate.next_time(&kernel))), Poll::Ready(()));
    assert_eq!(gate.last_wake(), at(20));

    // ...but 30 isn't.
    assert_eq!(poll_once(pin!(gate.next_time(&kernel))), Poll::Pending);
    assert_eq!(gate.last_wake(), at(20));

    let stats = gate.stats();
    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.late_cycles, 2);
    assert_eq!(stats.worst_lateness, Ticks(17));
}

#[test]
fn deadlines_form_a_lattice_whatever_the_lateness() {
    let kernel = SimKernel::starting_at(3);
    let period = 25;
    let mut gate = PeriodicGate::new(Ticks(period), &kernel);

    // Cheap deterministic jitter in 0..40, sometimes more than a period.
    let mut seed = 0x1234_5678u32;
    for k in 1..=200u64 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let jitter = u64::from(seed >> 16) % 40;

        let target = gate.deadline();
        assert_eq!(target, at(3 + k * period));
        if kernel.peek() < target {
            kernel.set(target.ticks_since_boot() + jitter);
        }
        assert_eq!(poll_once(pin!(gate.next_time(&kernel))), Poll::Ready(()));
        assert_eq!(gate.last_wake(), target);
    }

    let sleeps = kernel.sleeps();
    for pair in sleeps.windows(2) {
        assert_eq!(pair[1].ticks_since(pair[0]), Ticks(period));
    }
}

#[test]
fn shifted_gates_run_out_of_phase() {
    let kernel = SimKernel::starting_at(100);
    let a = PeriodicGate::new(Ticks(50), &kernel);
    let b = PeriodicGate::new_shift(Ticks(50), Ticks(25), &kernel);
    assert_eq!(a.deadline(), at(150));
    assert_eq!(b.deadline(), at(175));
}
