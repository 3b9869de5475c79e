// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark orchestration.
//!
//! One run walks the state machine
//! `Idle → PoolWarming → RwLockPhase → MutexPhase → Draining → Idle`,
//! timing each phase separately. A run that fails or is cancelled goes
//! straight back to `Idle` and its pool is discarded; the next run always
//! builds a fresh pool.
//!
//! Requests that arrive while a run is in flight are handled according to
//! [`BusyPolicy`].

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::{AbortReason, BenchError, BenchResult, PoolError, StateTransitionError};
use crate::fanout;
use crate::guard::{GuardStrategy, MutexGuard, RwLockGuard};
use crate::pool::WorkerPool;
use crate::sync::CancelToken;
use crate::timing::{self, Timer};
use crate::types::{Phase, RunParams};

/// Runner lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerState {
    /// Ready to accept a run request.
    Idle,
    /// Spawning workers and waiting for the readiness handshake.
    PoolWarming,
    /// Timing the reader/writer lock phase.
    RwLockPhase,
    /// Timing the exclusive monitor phase.
    MutexPhase,
    /// Shutting the pool down.
    Draining,
}

impl RunnerState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PoolWarming => "PoolWarming",
            Self::RwLockPhase => "RwLockPhase",
            Self::MutexPhase => "MutexPhase",
            Self::Draining => "Draining",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: RunnerState) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::PoolWarming) |
            (Self::PoolWarming, Self::RwLockPhase) |
            (Self::RwLockPhase, Self::MutexPhase) |
            (Self::MutexPhase, Self::Draining) |
            (Self::Draining, Self::Idle) |
            // abort paths
            (Self::PoolWarming, Self::Idle) |
            (Self::RwLockPhase, Self::Idle) |
            (Self::MutexPhase, Self::Idle)
        )
    }

    /// The state that times `phase`.
    pub const fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::RwLock => Self::RwLockPhase,
            Phase::Mutex => Self::MutexPhase,
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with a run request while another run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Fail the new request with `BenchError::Busy`.
    #[default]
    Reject,
    /// Wait in FIFO order; at most `capacity` requests may wait.
    Queue { capacity: usize },
    /// Cancel the in-flight run and start the new one once it unwinds.
    CancelAndReplace,
}

/// How the pool is torn down after the second phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// Stop accepting work and return immediately.
    #[default]
    Detach,
    /// Wait for every worker thread to exit.
    Join,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerConfig {
    pub busy_policy: BusyPolicy,
    pub drain: DrainMode,
}

/// Structured record emitted for each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub worker_count: usize,
    pub iteration_count: u64,
    pub elapsed_nanos: u64,
}

/// Result of one complete run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub worker_count: usize,
    pub iteration_count: u64,
    pub rwlock: PhaseRecord,
    pub mutex: PhaseRecord,
    /// Worker threads still alive when the run returned. Always 0 with `DrainMode::Join`.
    pub live_workers_after_drain: usize,
}

impl RunReport {
    pub fn rwlock_duration_nanos(&self) -> u64 {
        self.rwlock.elapsed_nanos
    }

    pub fn mutex_duration_nanos(&self) -> u64 {
        self.mutex.elapsed_nanos
    }
}

#[derive(Debug)]
struct Admission {
    state: RunnerState,
    /// Token of the run currently holding the runner. `Some` means busy.
    active: Option<CancelToken>,
    queue: VecDeque<u64>,
    next_ticket: u64,
    replace_generation: u64,
}

impl Admission {
    fn busy(&self) -> bool {
        self.active.is_some()
    }
}

/// Releases the runner when a run ends, however it ends.
struct RunTicket<'a> {
    runner: &'a BenchmarkRunner,
    token: CancelToken,
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        let mut admission = self.runner.admission.lock();
        if admission.state != RunnerState::Idle {
            tracing::debug!(from = admission.state.name(), to = "Idle", "State transition");
        }
        admission.state = RunnerState::Idle;
        admission.active = None;
        self.runner.idle.notify_all();
    }
}

/// Orchestrates benchmark runs. Shareable across threads; `stop()` may be
/// called from any thread while `run()` blocks on another.
pub struct BenchmarkRunner {
    config: RunnerConfig,
    admission: Mutex<Admission>,
    idle: Condvar,
}

impl BenchmarkRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            admission: Mutex::new(Admission {
                state: RunnerState::Idle,
                active: None,
                queue: VecDeque::new(),
                next_ticket: 0,
                replace_generation: 0,
            }),
            idle: Condvar::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        self.admission.lock().state
    }

    /// Requests parked under `BusyPolicy::Queue`.
    pub fn queued(&self) -> usize {
        self.admission.lock().queue.len()
    }

    /// Cancel the in-flight run, if any. Returns false when there was nothing to stop.
    pub fn stop(&self) -> bool {
        let admission = self.admission.lock();
        match &admission.active {
            Some(token) => {
                tracing::info!(state = admission.state.name(), "Stop requested");
                token.cancel(AbortReason::Stopped)
            }
            None => false,
        }
    }

    /// Run both phases and report their durations.
    ///
    /// Blocks the calling thread for the whole run, including any wait imposed
    /// by the busy policy.
    pub fn run(&self, params: RunParams) -> BenchResult<RunReport> {
        let ticket = self.admit()?;

        tracing::info!(
            worker_count = params.worker_count.get(),
            iteration_count = params.iteration_count.get(),
            "Benchmark run starting"
        );

        let result = self.execute(params, &ticket.token);

        match &result {
            Ok(report) => tracing::info!(
                rwlock_nanos = report.rwlock_duration_nanos(),
                mutex_nanos = report.mutex_duration_nanos(),
                "Benchmark run complete"
            ),
            Err(err) => tracing::warn!(
                phase = err.phase().map(|p| p.name()).unwrap_or("none"),
                error = %err,
                "Benchmark run failed"
            ),
        }

        drop(ticket);
        result
    }

    fn admit(&self) -> BenchResult<RunTicket<'_>> {
        let mut admission = self.admission.lock();

        match self.config.busy_policy {
            BusyPolicy::Reject => {
                if admission.busy() {
                    return Err(BenchError::Busy {
                        state: admission.state,
                    });
                }
            }
            BusyPolicy::Queue { capacity } => {
                if admission.busy() || !admission.queue.is_empty() {
                    if admission.queue.len() >= capacity {
                        return Err(BenchError::Busy {
                            state: admission.state,
                        });
                    }

                    let ticket = admission.next_ticket;
                    admission.next_ticket += 1;
                    admission.queue.push_back(ticket);
                    tracing::debug!(ticket, waiting = admission.queue.len(), "Run request queued");

                    while admission.busy() || admission.queue.front() != Some(&ticket) {
                        self.idle.wait(&mut admission);
                    }
                    admission.queue.pop_front();
                }
            }
            BusyPolicy::CancelAndReplace => {
                if admission.busy() {
                    admission.replace_generation += 1;
                    let generation = admission.replace_generation;
                    tracing::debug!(generation, "Replacing in-flight run");
                    // an older replacer still waiting gives up now
                    self.idle.notify_all();

                    while admission.busy() {
                        // re-cancel on every wake: a plain request may have
                        // been admitted between the old run ending and us waking
                        if let Some(token) = &admission.active {
                            token.cancel(AbortReason::Superseded);
                        }
                        self.idle.wait(&mut admission);
                        if admission.replace_generation != generation {
                            return Err(BenchError::Superseded);
                        }
                    }
                }
            }
        }

        let token = CancelToken::new();
        admission.active = Some(token.clone());
        // another queued request may now be at the front
        self.idle.notify_all();

        Ok(RunTicket {
            runner: self,
            token,
        })
    }

    fn transition(&self, target: RunnerState) -> Result<(), StateTransitionError> {
        let mut admission = self.admission.lock();
        if !admission.state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: admission.state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = admission.state.name(),
            to = target.name(),
            "State transition"
        );
        admission.state = target;
        Ok(())
    }

    fn execute(&self, params: RunParams, token: &CancelToken) -> BenchResult<RunReport> {
        self.transition(RunnerState::PoolWarming)?;

        let (pool, warm_up) = timing::measure(|| WorkerPool::warm_up(params.worker_count, token));
        let mut pool = pool.map_err(|err| match err {
            PoolError::WarmupAborted { reason } => BenchError::WarmupAborted { reason },
            other => other.into(),
        })?;
        tracing::debug!(
            workers = params.worker_count.get(),
            warm_up_nanos = timing::nanos(warm_up),
            "Pool warm"
        );

        // a pool that saw a failed or aborted phase is never reused
        let phases = self
            .timed_phase(&pool, RwLockGuard::new(), params, token)
            .and_then(|rwlock| {
                let mutex = self.timed_phase(&pool, MutexGuard::new(), params, token)?;
                Ok((rwlock, mutex))
            });
        let (rwlock, mutex) = match phases {
            Ok(records) => records,
            Err(err) => {
                self.discard(pool);
                return Err(err);
            }
        };

        self.transition(RunnerState::Draining)?;
        let live_workers_after_drain = match self.config.drain {
            DrainMode::Detach => {
                pool.shutdown();
                pool.live_workers()
            }
            DrainMode::Join => pool.join(),
        };
        self.transition(RunnerState::Idle)?;

        Ok(RunReport {
            worker_count: params.worker_count.get(),
            iteration_count: params.iteration_count.get(),
            rwlock,
            mutex,
            live_workers_after_drain,
        })
    }

    /// Tear down the pool of a run that did not reach `Draining`, honouring
    /// the drain mode. Queued stragglers see the cancelled token and skip
    /// their reads, so a join here is short.
    fn discard(&self, pool: WorkerPool) {
        match self.config.drain {
            DrainMode::Detach => drop(pool),
            DrainMode::Join => {
                let live = pool.join();
                tracing::debug!(live, "Discarded pool joined");
            }
        }
    }

    fn timed_phase<G: GuardStrategy>(
        &self,
        pool: &WorkerPool,
        guard: G,
        params: RunParams,
        token: &CancelToken,
    ) -> BenchResult<PhaseRecord> {
        let phase = guard.phase();
        self.transition(RunnerState::for_phase(phase))?;

        let timer = Timer::start();
        let outcome = fanout::run(pool, guard, params.iteration_count, token)?;
        let elapsed_nanos = timer.stop();

        let record = PhaseRecord {
            phase,
            worker_count: params.worker_count.get(),
            iteration_count: params.iteration_count.get(),
            elapsed_nanos,
        };

        tracing::info!(
            phase = %record.phase,
            worker_count = record.worker_count,
            iteration_count = record.iteration_count,
            elapsed_nanos = record.elapsed_nanos,
            elapsed = %timing::format_nanos(record.elapsed_nanos),
            completed = outcome.completed,
            "Phase complete"
        );

        Ok(record)
    }
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn params(workers: usize, iterations: u64) -> RunParams {
        RunParams::new(workers, iterations).unwrap()
    }

    fn replacing() -> Arc<BenchmarkRunner> {
        Arc::new(BenchmarkRunner::new(RunnerConfig {
            busy_policy: BusyPolicy::CancelAndReplace,
            drain: DrainMode::Join,
        }))
    }

    /// Mark the runner busy with a stand-in run that only ends on `release`.
    fn occupy(runner: &BenchmarkRunner) -> CancelToken {
        let token = CancelToken::new();
        runner.admission.lock().active = Some(token.clone());
        token
    }

    fn release(runner: &BenchmarkRunner) {
        runner.admission.lock().active = None;
        runner.idle.notify_all();
    }

    fn replace_generation(runner: &BenchmarkRunner) -> u64 {
        runner.admission.lock().replace_generation
    }

    fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn spawn_run(
        runner: &Arc<BenchmarkRunner>,
        params: RunParams,
    ) -> thread::JoinHandle<BenchResult<RunReport>> {
        let runner = Arc::clone(runner);
        thread::spawn(move || runner.run(params))
    }

    #[test]
    fn test_state_transitions() {
        use RunnerState::*;
        assert!(Idle.can_transition_to(PoolWarming));
        assert!(PoolWarming.can_transition_to(RwLockPhase));
        assert!(RwLockPhase.can_transition_to(MutexPhase));
        assert!(MutexPhase.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(MutexPhase));
        assert!(!RwLockPhase.can_transition_to(Draining));
        assert!(!Draining.can_transition_to(PoolWarming));
    }

    #[test]
    fn test_for_phase() {
        assert_eq!(RunnerState::for_phase(Phase::RwLock), RunnerState::RwLockPhase);
        assert_eq!(RunnerState::for_phase(Phase::Mutex), RunnerState::MutexPhase);
    }

    #[test]
    fn test_empty_run() {
        let runner = BenchmarkRunner::default();
        let report = runner.run(params(1, 0)).unwrap();

        assert_eq!(report.rwlock.phase, Phase::RwLock);
        assert_eq!(report.mutex.phase, Phase::Mutex);
        assert_eq!(report.iteration_count, 0);
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[test]
    fn test_stop_without_run() {
        let runner = BenchmarkRunner::default();
        assert!(!runner.stop());
    }

    #[test]
    fn test_join_drain_leaves_no_workers() {
        let runner = BenchmarkRunner::new(RunnerConfig {
            drain: DrainMode::Join,
            ..Default::default()
        });
        let report = runner.run(params(3, 500)).unwrap();
        assert_eq!(report.live_workers_after_drain, 0);
        assert_eq!(report.rwlock.worker_count, 3);
    }

    #[test]
    fn test_report_serializes_phase_names() {
        let runner = BenchmarkRunner::default();
        let report = runner.run(params(1, 10)).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"phase\":\"rwlock\""));
        assert!(json.contains("\"phase\":\"mutex\""));
        assert!(json.contains("elapsed_nanos"));
    }

    #[test]
    fn test_stop_during_warm_up() {
        let runner = BenchmarkRunner::default();
        let ticket = runner.admit().unwrap();
        assert!(runner.stop());

        let err = runner.execute(params(2, 10), &ticket.token).unwrap_err();
        assert!(matches!(
            err,
            BenchError::WarmupAborted {
                reason: AbortReason::Stopped
            }
        ));
        assert!(err.is_abort());
        assert!(err.phase().is_none());
        assert_eq!(runner.state(), RunnerState::PoolWarming);

        drop(ticket);
        assert_eq!(runner.state(), RunnerState::Idle);
        assert!(runner.run(params(1, 10)).is_ok());
    }

    #[test]
    fn test_newer_replacer_supersedes_waiting_one() {
        let runner = replacing();
        let in_flight = occupy(&runner);

        let older = spawn_run(&runner, params(1, 10));
        wait_until("first replacer", || replace_generation(&runner) == 1);
        assert_eq!(in_flight.reason(), Some(AbortReason::Superseded));

        let newer = spawn_run(&runner, params(1, 20));
        let older = older.join().unwrap();
        assert!(matches!(older, Err(BenchError::Superseded)));
        assert_eq!(replace_generation(&runner), 2);

        release(&runner);
        let report = newer.join().unwrap().unwrap();
        assert_eq!(report.iteration_count, 20);
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[test]
    fn test_waiting_replacer_cancels_newcomer() {
        let runner = replacing();
        let in_flight = occupy(&runner);

        let replacer = spawn_run(&runner, params(1, 10));
        wait_until("replacer", || replace_generation(&runner) == 1);
        assert!(in_flight.is_cancelled());

        // the old run ends and a plain request takes the runner before the
        // replacer gets to run
        let newcomer = {
            let mut admission = runner.admission.lock();
            let token = CancelToken::new();
            admission.active = Some(token.clone());
            runner.idle.notify_all();
            token
        };

        wait_until("newcomer cancelled", || newcomer.is_cancelled());
        assert_eq!(newcomer.reason(), Some(AbortReason::Superseded));
        assert_eq!(replace_generation(&runner), 1);

        release(&runner);
        let report = replacer.join().unwrap().unwrap();
        assert_eq!(report.iteration_count, 10);
    }
}
