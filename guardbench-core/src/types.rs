// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time, so the runner never
//! sees a zero-sized pool.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Upper bound on pool size.
pub const MAX_WORKER_COUNT: usize = 1024;
/// Iterations per phase when the trigger does not say otherwise.
pub const DEFAULT_ITERATION_COUNT: u64 = 1_000_000;

/// Validated pool size: 1..=1024 worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct WorkerCount(NonZeroUsize);

impl WorkerCount {
    /// Create a new WorkerCount with validation.
    pub fn new(count: usize) -> Result<Self, HardValidationError> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Err(HardValidationError::InvalidFieldValue {
                field: "worker_count",
                value: "0".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        };

        if count.get() > MAX_WORKER_COUNT {
            return Err(HardValidationError::InvalidFieldValue {
                field: "worker_count",
                value: count.to_string(),
                reason: format!("Must not exceed {}", MAX_WORKER_COUNT),
            });
        }

        Ok(Self(count))
    }

    /// One worker per logical CPU, clamped to the allowed range.
    pub fn available() -> Self {
        let cpus = num_cpus::get().clamp(1, MAX_WORKER_COUNT);
        // clamp guarantees non-zero
        Self(NonZeroUsize::new(cpus).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::available()
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<usize> for WorkerCount {
    type Error = HardValidationError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkerCount> for usize {
    fn from(value: WorkerCount) -> Self {
        value.get()
    }
}

/// Number of guarded reads dispatched per phase. Zero is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationCount(u64);

impl IterationCount {
    pub const fn new(count: u64) -> Self {
        Self(count)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl Default for IterationCount {
    fn default() -> Self {
        Self(DEFAULT_ITERATION_COUNT)
    }
}

impl fmt::Display for IterationCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for IterationCount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One timed execution of the fan-out/fan-in protocol under a guard strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Reader/writer lock: concurrent reads, exclusive create/destroy.
    RwLock,
    /// Single exclusive monitor for every operation.
    Mutex,
}

impl Phase {
    /// Phases in the order a run executes them.
    pub const ALL: [Phase; 2] = [Phase::RwLock, Phase::Mutex];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::RwLock => "rwlock",
            Self::Mutex => "mutex",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters supplied by the trigger for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub worker_count: WorkerCount,
    pub iteration_count: IterationCount,
}

impl RunParams {
    /// Validate raw trigger values.
    pub fn new(worker_count: usize, iteration_count: u64) -> Result<Self, HardValidationError> {
        Ok(Self {
            worker_count: WorkerCount::new(worker_count)?,
            iteration_count: IterationCount::new(iteration_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_bounds() {
        assert!(WorkerCount::new(0).is_err());
        assert!(WorkerCount::new(MAX_WORKER_COUNT + 1).is_err());
        assert_eq!(WorkerCount::new(1).unwrap().get(), 1);
        assert_eq!(WorkerCount::new(MAX_WORKER_COUNT).unwrap().get(), MAX_WORKER_COUNT);
    }

    #[test]
    fn test_defaults() {
        let params = RunParams::default();
        assert_eq!(params.iteration_count.get(), 1_000_000);
        assert_eq!(params.worker_count.get(), num_cpus::get().min(MAX_WORKER_COUNT));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::RwLock.to_string(), "rwlock");
        assert_eq!(Phase::Mutex.to_string(), "mutex");
        assert_eq!(Phase::ALL, [Phase::RwLock, Phase::Mutex]);
        assert_eq!(serde_yaml::to_string(&Phase::RwLock).unwrap().trim(), "rwlock");
    }

    #[test]
    fn test_worker_count_deserialize_validates() {
        let ok: WorkerCount = serde_yaml::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_yaml::from_str::<WorkerCount>("0").is_err());
    }
}
