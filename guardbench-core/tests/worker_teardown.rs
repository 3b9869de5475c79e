// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process thread count returns to baseline after every run, completed or
//! stopped.
//!
//! Kept in its own test binary with a single test so no other test's threads
//! show up in the count.

#![cfg(target_os = "linux")]

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use guardbench_core::{
    AbortReason, BenchError, BenchmarkRunner, DrainMode, RunParams, RunnerConfig, RunnerState,
};

fn thread_count() -> usize {
    fs::read_dir("/proc/self/task")
        .expect("procfs available")
        .count()
}

/// Threads named by the pool. The kernel truncates names to 15 bytes.
fn worker_threads() -> usize {
    fs::read_dir("/proc/self/task")
        .expect("procfs available")
        .filter_map(|entry| fs::read_to_string(entry.ok()?.path().join("comm")).ok())
        .filter(|comm| comm.starts_with("guardbench-work"))
        .count()
}

#[test]
fn test_no_leaked_workers_across_runs() {
    let runner = Arc::new(BenchmarkRunner::new(RunnerConfig {
        drain: DrainMode::Join,
        ..Default::default()
    }));
    let params = RunParams::new(4, 100_000).unwrap();
    let baseline = thread_count();

    for _ in 0..2 {
        let report = runner.run(params).expect("run succeeds");
        assert_eq!(report.live_workers_after_drain, 0);
        assert_eq!(thread_count(), baseline);
        assert_eq!(worker_threads(), 0);
    }

    // a stopped run joins its pool too
    let handle = {
        let runner = Arc::clone(&runner);
        thread::spawn(move || runner.run(RunParams::new(2, 10_000_000).unwrap()))
    };

    let deadline = Instant::now() + Duration::from_secs(30);
    while !matches!(
        runner.state(),
        RunnerState::RwLockPhase | RunnerState::MutexPhase
    ) {
        assert!(Instant::now() < deadline, "runner never reached a phase");
        thread::sleep(Duration::from_micros(100));
    }
    assert!(runner.stop());

    let err = handle.join().expect("run thread").unwrap_err();
    assert!(matches!(
        err,
        BenchError::PhaseAborted {
            reason: AbortReason::Stopped,
            ..
        }
    ));
    assert_eq!(worker_threads(), 0);
    assert_eq!(thread_count(), baseline);

    let report = runner.run(params).expect("rerun succeeds");
    assert_eq!(report.live_workers_after_drain, 0);
    assert_eq!(worker_threads(), 0);
}
