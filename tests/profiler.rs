// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::{at, LineLog};
use rtmon::hal::Level;
use rtmon::profiler::{Anomaly, LineProbe, Profiler, Utilization};
use rtmon::task::TaskId;
use rtmon::time::Ticks;

/// Plays a well-formed switch trace: `(task, ticks it runs)` in order,
/// starting from `Idle` running at boot.
fn play(profiler: &Profiler<impl rtmon::profiler::TraceProbe>, schedule: &[(TaskId, u64)]) {
    let mut running = TaskId::Idle;
    let mut now = 0;
    profiler.on_switch_in(running, at(now));
    for &(task, ticks) in schedule {
        profiler.on_switch_out(running, at(now));
        profiler.on_switch_in(task, at(now));
        running = task;
        now += ticks;
    }
    profiler.on_switch_out(running, at(now));
    profiler.on_switch_in(TaskId::Idle, at(now));
}

#[test]
fn known_schedule_gives_known_utilization() {
    let p = Profiler::new(());
    play(&p, &[
        (TaskId::Idle, 30),
        (TaskId::Button1, 5),
        (TaskId::UartReceiver, 10),
        (TaskId::Idle, 45),
        (TaskId::PeriodicTransmitter, 10),
    ]);

    assert_eq!(p.busy_time(TaskId::Button1), Ticks(5));
    assert_eq!(p.busy_time(TaskId::UartReceiver), Ticks(10));
    assert_eq!(p.busy_time(TaskId::PeriodicTransmitter), Ticks(10));
    assert_eq!(p.busy_time(TaskId::Idle), Ticks::ZERO);

    let u = p.utilization();
    assert_eq!(u, Utilization { busy: Ticks(25), elapsed: at(100) });
    assert_eq!(u.basis_points(), Some(2_500));
    assert!(p.health().is_ok());
}

#[test]
fn busy_never_exceeds_elapsed_on_random_traces() {
    let p = Profiler::new(());
    let mut seed = 0xdead_beefu32;
    let mut running = TaskId::Idle;
    let mut now = 0u64;
    p.on_switch_in(running, at(now));

    for _ in 0..5_000 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        now += u64::from(seed >> 20) % 17;
        let next = TaskId::ALL[(seed >> 8) as usize % TaskId::COUNT];

        p.on_switch_out(running, at(now));
        p.on_switch_in(next, at(now));
        running = next;

        let report = p.report();
        let sum: u64 = report.tasks.iter().map(|(_, r)| r.busy().0).sum();
        assert_eq!(sum, report.utilization.busy.0);
        assert!(sum <= now);
        assert!(report.utilization.is_plausible());
    }
    assert!(p.health().is_ok());
}

#[test]
fn trace_lines_follow_the_running_task() {
    let p = Profiler::new(LineProbe(LineLog::default()));
    play(&p, &[(TaskId::Button2, 3)]);

    let changes = p.with_probe(|probe| probe.0.changes.clone());
    assert_eq!(changes, [
        (TaskId::Idle, Level::High),
        (TaskId::Idle, Level::Low),
        (TaskId::Button2, Level::High),
        (TaskId::Button2, Level::Low),
        (TaskId::Idle, Level::High),
    ]);
}

#[test]
fn over_utilization_is_reported_unclamped() {
    let p = Profiler::new(());
    // A switch-in timestamped before the previous switch-out makes two tasks
    // overlap in time.
    p.on_switch_in(TaskId::Load1, at(0));
    p.on_switch_in(TaskId::Load2, at(0));
    p.on_switch_out(TaskId::Load1, at(10));
    p.on_switch_out(TaskId::Load2, at(10));

    let u = p.utilization();
    assert_eq!(u.busy, Ticks(20));
    assert_eq!(u.basis_points(), Some(20_000));
    assert!((u.percent() - 200.0).abs() < 1e-3);

    let h = p.health();
    assert_eq!(h.over_utilizations, 1);
    assert!(matches!(h.last, Some(Anomaly::OverUtilization { .. })));
}

#[test]
fn since_boot_average_versus_interval() {
    let p = Profiler::new(());
    // Idle for a long time, then fully busy for a short time.
    p.on_switch_in(TaskId::Idle, at(0));
    p.on_switch_out(TaskId::Idle, at(9_000));
    p.on_switch_in(TaskId::Load1, at(9_000));
    let before = p.utilization();
    p.on_switch_out(TaskId::Load1, at(10_000));
    let after = p.utilization();

    assert_eq!(after.basis_points(), Some(1_000));
    let recent = after.since(before).unwrap();
    assert_eq!(recent.basis_points(), Some(10_000));
}

#[test]
fn anomalies_render_readably() {
    let a = Anomaly::UnpairedSwitchOut { task: TaskId::Button1, at: at(12) };
    assert_eq!(
        a.to_string(),
        "Button_1_Monitor switched out at 12 without a switch-in",
    );
}
