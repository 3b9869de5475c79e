// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! guardbench Core Library
//!
//! Measures what it costs many independent tasks to read one shared cell
//! under a reader/writer lock versus a single exclusive monitor, on a warmed
//! fixed-size worker pool. Provides the warm-up handshake, both guard
//! strategies, the fan-out/fan-in phase driver, and the run orchestrator.

pub mod cell;
pub mod config;
pub mod error;
pub mod fanout;
pub mod guard;
pub mod pool;
pub mod runner;
pub mod sync;
pub mod timing;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader};
pub use error::{AbortReason, BenchError, BenchResult, HardValidationError, PoolError};
pub use fanout::PhaseOutcome;
pub use guard::{GuardStrategy, MutexGuard, RwLockGuard};
pub use pool::{PoolState, WorkerPool};
pub use runner::{
    BenchmarkRunner, BusyPolicy, DrainMode, PhaseRecord, RunReport, RunnerConfig, RunnerState,
};
pub use sync::{CancelToken, CountdownLatch};
pub use types::{IterationCount, Phase, RunParams, WorkerCount};
