// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fan-out/fan-in: dispatch M guarded reads and join on all of them.
//!
//! Ordering per phase:
//!
//! ```text
//! create()  ->  dispatch M reads  ->  wait(latch == 0)  ->  destroy()
//! ```
//!
//! Every read is queued after `create()` returns and the caller does not reach
//! `destroy()` until the latch has seen all M completions, so no read can find
//! the cell absent. Completion is signalled from a drop guard: a read that
//! fails or panics still counts down, and the failure is reported through
//! [`FailureLog`] instead of hanging the join.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{BenchError, BenchResult};
use crate::guard::GuardStrategy;
use crate::pool::WorkerPool;
use crate::sync::{CancelToken, CountdownLatch};
use crate::types::{IterationCount, Phase};

/// How often the dispatch loop polls the cancel token.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Tally of one finished phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Latch value when the join returned.
    pub remaining: u64,
    /// Whether the cell still held a snapshot after `destroy()`.
    pub cell_present_after: bool,
}

/// Side channel for task failures, read by the orchestrator after the join.
#[derive(Debug, Default)]
pub struct FailureLog {
    completed: AtomicU64,
    absent: AtomicU64,
    panicked: AtomicU64,
    skipped: AtomicU64,
    first: Mutex<Option<String>>,
}

impl FailureLog {
    fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_absent(&self) {
        self.absent.fetch_add(1, Ordering::Relaxed);
        self.note_first(|| "read observed an absent cell".to_string());
    }

    fn record_panic(&self, payload: Box<dyn Any + Send>) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        self.note_first(|| format!("task panicked: {}", panic_message(payload.as_ref())));
    }

    fn note_first(&self, message: impl FnOnce() -> String) {
        let mut first = self.first.lock();
        if first.is_none() {
            *first = Some(message());
        }
    }

    fn failed(&self) -> u64 {
        self.absent.load(Ordering::Acquire) + self.panicked.load(Ordering::Acquire)
    }

    /// Turn recorded failures into a phase error. Absent-cell reads win.
    fn check(&self, phase: Phase) -> BenchResult<()> {
        let absent = self.absent.load(Ordering::Acquire);
        if absent > 0 {
            return Err(BenchError::InvariantViolation {
                phase,
                observed: absent,
            });
        }

        let failed = self.failed();
        if failed > 0 {
            return Err(BenchError::PhaseFailed {
                phase,
                failed,
                first: self.first.lock().clone().unwrap_or_default(),
            });
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// State every task of one phase shares through a single `Arc`.
struct PhaseShared<G> {
    guard: G,
    latch: CountdownLatch,
    log: FailureLog,
    token: CancelToken,
}

/// Counts the latch down when the task ends, on every exit path.
struct TaskScope<G> {
    shared: Arc<PhaseShared<G>>,
}

impl<G> Drop for TaskScope<G> {
    fn drop(&mut self) {
        self.shared.latch.count_down();
    }
}

impl<G: GuardStrategy> TaskScope<G> {
    fn run(&self) {
        let shared = &self.shared;
        if shared.token.is_cancelled() {
            shared.log.record_skipped();
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| shared.guard.read())) {
            Ok(Ok(_snapshot)) => shared.log.record_completed(),
            Ok(Err(_absent)) => shared.log.record_absent(),
            Err(payload) => shared.log.record_panic(payload),
        }
    }
}

/// Run one phase of `iterations` guarded reads on `pool`.
///
/// Takes ownership of `guard` for the phase. If `token` is cancelled while
/// waiting the phase returns `PhaseAborted` without calling `destroy()`;
/// straggling tasks keep the guard alive until they finish.
pub fn run<G: GuardStrategy>(
    pool: &WorkerPool,
    guard: G,
    iterations: IterationCount,
    token: &CancelToken,
) -> BenchResult<PhaseOutcome> {
    let phase = guard.phase();
    let total = iterations.get();

    guard.create();

    let shared = Arc::new(PhaseShared {
        guard,
        latch: CountdownLatch::new(total),
        log: FailureLog::default(),
        token: token.clone(),
    });

    for index in 0..total {
        if index % CANCEL_CHECK_INTERVAL == 0 && token.is_cancelled() {
            tracing::debug!(phase = %phase, dispatched = index, "Dispatch stopped by cancellation");
            break;
        }

        let scope = TaskScope {
            shared: Arc::clone(&shared),
        };
        pool.dispatch(move || scope.run())?;
    }

    if let Err(reason) = shared.latch.wait_cancellable(token) {
        tracing::warn!(
            phase = %phase,
            reason = %reason,
            remaining = shared.latch.count(),
            "Phase aborted before all reads completed"
        );
        return Err(BenchError::PhaseAborted { phase, reason });
    }

    shared.guard.destroy();

    let outcome = PhaseOutcome {
        phase,
        completed: shared.log.completed.load(Ordering::Acquire),
        failed: shared.log.failed(),
        skipped: shared.log.skipped.load(Ordering::Acquire),
        remaining: shared.latch.count(),
        cell_present_after: shared.guard.is_present(),
    };

    if let Err(err) = shared.log.check(phase) {
        tracing::warn!(phase = %phase, error = %err, "Phase failed");
        return Err(err);
    }

    Ok(outcome)
}
