// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-size worker pool with a warm-up handshake.
//!
//! [`WorkerPool::warm_up`] does not return until every worker thread has
//! picked up and run one readiness task, so the first timed dispatch never
//! pays for thread start-up. The handshake is two-phase:
//!
//! 1. One readiness task per worker is queued. Each waits on a shared
//!    release latch, records a [`ReadinessMark`], counts down the ready latch,
//!    then holds its worker until all workers have counted down.
//! 2. The driver opens the release latch right after queueing, then waits on
//!    the ready latch.
//!
//! Holding each worker in step 1 makes the n marks come from n distinct
//! threads: a worker cannot absorb a second readiness task while its first
//! one is still parked.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::PoolError;
use crate::sync::{CancelToken, CountdownLatch};
use crate::types::WorkerCount;

type Job = Box<dyn FnOnce(usize) + Send + 'static>;

/// Pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Threads spawned, readiness handshake not finished.
    Building,
    /// Every worker is live and idle; dispatch is accepted.
    Warm,
    /// No new dispatch; some workers are still draining the queue.
    ShuttingDown,
    /// Every worker thread has exited.
    ShutDown,
}

/// A worker checking in during warm-up.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessMark {
    pub worker: usize,
    pub at: Instant,
}

/// Decrements the live-worker count when a worker thread exits, however it exits.
struct LiveWorker(Arc<AtomicUsize>);

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// N worker threads pulling from one shared queue.
///
/// Dropping the pool shuts it down without waiting for the queue to drain.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    live: Arc<AtomicUsize>,
    worker_count: WorkerCount,
    readiness: Vec<ReadinessMark>,
    warm: bool,
}

impl WorkerPool {
    /// Spawn `worker_count` threads and block until all of them are live.
    ///
    /// If `token` is cancelled before the handshake completes the pool is shut
    /// down and `PoolError::WarmupAborted` is returned; the caller must not
    /// dispatch onto it.
    pub fn warm_up(worker_count: WorkerCount, token: &CancelToken) -> Result<Self, PoolError> {
        if let Some(reason) = token.reason() {
            return Err(PoolError::WarmupAborted { reason });
        }

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let live = Arc::new(AtomicUsize::new(0));

        let mut pool = Self {
            sender: Some(sender),
            handles: Vec::with_capacity(worker_count.get()),
            live: Arc::clone(&live),
            worker_count,
            readiness: Vec::new(),
            warm: false,
        };

        for index in 0..worker_count.get() {
            let receiver = Arc::clone(&receiver);
            let live_worker = LiveWorker(Arc::clone(&live));
            live.fetch_add(1, Ordering::AcqRel);

            let spawned = thread::Builder::new()
                .name(format!("guardbench-worker-{}", index))
                .spawn(move || worker_loop(index, &receiver, live_worker));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    // closure (and its LiveWorker) was dropped with the failed spawn
                    pool.shutdown();
                    return Err(PoolError::Spawn { index, source });
                }
            }
        }

        tracing::debug!(workers = worker_count.get(), "Worker threads spawned");

        pool.await_readiness(token)?;
        Ok(pool)
    }

    fn await_readiness(&mut self, token: &CancelToken) -> Result<(), PoolError> {
        let n = self.worker_count.get();
        let release = CountdownLatch::new(1);
        let ready = CountdownLatch::new(n as u64);
        let marks = Arc::new(Mutex::new(Vec::with_capacity(n)));

        for _ in 0..n {
            let release = release.clone();
            let ready = ready.clone();
            let marks = Arc::clone(&marks);
            let token = token.clone();

            self.dispatch_indexed(Box::new(move |worker| {
                release.wait();
                marks.lock().push(ReadinessMark {
                    worker,
                    at: Instant::now(),
                });
                ready.count_down();
                // park until every worker has checked in; on abort the driver
                // discards the pool and the worker is simply released
                if let Err(reason) = ready.wait_cancellable(&token) {
                    tracing::trace!(worker, reason = %reason, "Readiness wait aborted");
                }
            }))?;
        }

        release.count_down();

        if let Err(reason) = ready.wait_cancellable(token) {
            tracing::warn!(reason = %reason, "Pool warm-up aborted, discarding pool");
            self.shutdown();
            return Err(PoolError::WarmupAborted { reason });
        }

        self.readiness = std::mem::take(&mut *marks.lock());
        self.warm = true;
        tracing::debug!(workers = n, "Worker pool warm");
        Ok(())
    }

    /// Queue one unit of work for any idle worker. Never blocks.
    pub fn dispatch<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_indexed(Box::new(move |_| task()))
    }

    fn dispatch_indexed(&self, job: Job) -> Result<(), PoolError> {
        let sender = self.sender.as_ref().ok_or(PoolError::ShutDown)?;
        sender.send(job).map_err(|_| PoolError::ShutDown)
    }

    /// Stop accepting work. Queued and in-flight tasks still run; does not wait.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_some() {
            tracing::debug!(
                workers = self.worker_count.get(),
                live = self.live_workers(),
                "Worker pool shutting down"
            );
        }
    }

    /// Shut down and wait for every worker thread to exit.
    ///
    /// Returns the number of worker threads still alive afterwards (always 0
    /// unless a worker could not be joined).
    pub fn join(mut self) -> usize {
        self.shutdown();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Worker thread terminated abnormally");
            }
        }
        self.live_workers()
    }

    pub fn state(&self) -> PoolState {
        match (&self.sender, self.warm) {
            (Some(_), true) => PoolState::Warm,
            (Some(_), false) => PoolState::Building,
            (None, _) if self.live_workers() > 0 => PoolState::ShuttingDown,
            (None, _) => PoolState::ShutDown,
        }
    }

    pub fn worker_count(&self) -> WorkerCount {
        self.worker_count
    }

    /// Worker threads that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// One mark per worker, recorded during warm-up.
    pub fn readiness(&self) -> &[ReadinessMark] {
        &self.readiness
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("state", &self.state())
            .field("live", &self.live_workers())
            .finish()
    }
}

fn worker_loop(index: usize, receiver: &Mutex<mpsc::Receiver<Job>>, _live: LiveWorker) {
    loop {
        // lock is released before the job runs
        let job = receiver.lock().recv();
        let Ok(job) = job else {
            break;
        };

        if panic::catch_unwind(AssertUnwindSafe(|| job(index))).is_err() {
            tracing::warn!(worker = index, "Task panicked; worker continues");
        }
    }

    tracing::trace!(worker = index, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AbortReason;
    use std::collections::HashSet;

    fn workers(n: usize) -> WorkerCount {
        WorkerCount::new(n).unwrap()
    }

    #[test]
    fn test_warm_up_marks_every_worker() {
        let pool = WorkerPool::warm_up(workers(4), &CancelToken::new()).unwrap();
        assert_eq!(pool.state(), PoolState::Warm);
        assert_eq!(pool.live_workers(), 4);

        let distinct: HashSet<usize> = pool.readiness().iter().map(|m| m.worker).collect();
        assert_eq!(pool.readiness().len(), 4);
        assert_eq!(distinct.len(), 4);

        assert_eq!(pool.join(), 0);
    }

    #[test]
    fn test_readiness_precedes_first_dispatch() {
        let pool = WorkerPool::warm_up(workers(3), &CancelToken::new()).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.dispatch(move || tx.send(Instant::now()).unwrap()).unwrap();
        let first_task = rx.recv().unwrap();

        assert!(pool.readiness().iter().all(|mark| mark.at <= first_task));
        pool.join();
    }

    #[test]
    fn test_cancelled_token_aborts_warm_up() {
        let token = CancelToken::new();
        token.cancel(AbortReason::Stopped);

        let err = WorkerPool::warm_up(workers(2), &token).unwrap_err();
        assert!(matches!(
            err,
            PoolError::WarmupAborted {
                reason: AbortReason::Stopped
            }
        ));
    }

    #[test]
    fn test_dispatch_after_shutdown_rejected() {
        let mut pool = WorkerPool::warm_up(workers(2), &CancelToken::new()).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(matches!(pool.dispatch(|| {}), Err(PoolError::ShutDown)));
        assert_ne!(pool.state(), PoolState::Warm);
    }

    #[test]
    fn test_join_drains_queue() {
        let pool = WorkerPool::warm_up(workers(2), &CancelToken::new()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let done = Arc::clone(&done);
            pool.dispatch(move || {
                done.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        assert_eq!(pool.join(), 0);
        assert_eq!(done.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_panicking_task_keeps_worker() {
        let pool = WorkerPool::warm_up(workers(1), &CancelToken::new()).unwrap();
        pool.dispatch(|| panic!("task failure")).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.dispatch(move || tx.send(()).unwrap()).unwrap();
        rx.recv().unwrap();

        assert_eq!(pool.live_workers(), 1);
        pool.join();
    }
}
