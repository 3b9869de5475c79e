// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict validation.
//!
//! Every section is optional; anything left out falls back to the defaults
//! of the trigger surface (one worker per CPU, one million iterations, reject
//! concurrent runs, detached drain).

use std::path::Path;

use serde::Deserialize;

use crate::error::{BenchError, BenchResult, HardValidationError};
use crate::runner::{BusyPolicy, DrainMode, RunnerConfig};
use crate::types::{IterationCount, RunParams, WorkerCount, DEFAULT_ITERATION_COUNT};

/// Maximum number of queued run requests.
pub const MAX_QUEUE_CAPACITY: usize = 64;

/// Raw benchmark parameters as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBenchmarkConfig {
    #[serde(default)]
    worker_count: Option<usize>,
    #[serde(default = "default_iteration_count")]
    iteration_count: u64,
}

fn default_iteration_count() -> u64 {
    DEFAULT_ITERATION_COUNT
}

impl Default for RawBenchmarkConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            iteration_count: default_iteration_count(),
        }
    }
}

/// Raw runner configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRunnerConfig {
    #[serde(default = "default_busy_policy")]
    busy_policy: String,
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    #[serde(default)]
    drain: DrainMode,
}

fn default_busy_policy() -> String {
    "reject".to_string()
}

fn default_queue_capacity() -> usize {
    2
}

impl Default for RawRunnerConfig {
    fn default() -> Self {
        Self {
            busy_policy: default_busy_policy(),
            queue_capacity: default_queue_capacity(),
            drain: DrainMode::default(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    benchmark: RawBenchmarkConfig,
    #[serde(default)]
    runner: RawRunnerConfig,
}

/// Complete validated configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub benchmark: RunParams,
    pub runner: RunnerConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> BenchResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BenchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| BenchError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    pub fn load_string(content: &str) -> BenchResult<Config> {
        // an empty document means "all defaults"
        if content.trim().is_empty() {
            return Self::validate(RawConfig::default());
        }

        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| BenchError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> BenchResult<Config> {
        let worker_count = match raw.benchmark.worker_count {
            Some(count) => WorkerCount::new(count)?,
            None => WorkerCount::available(),
        };

        let benchmark = RunParams {
            worker_count,
            iteration_count: IterationCount::new(raw.benchmark.iteration_count),
        };

        let runner = RunnerConfig {
            busy_policy: Self::parse_busy_policy(&raw.runner)?,
            drain: raw.runner.drain,
        };

        Ok(Config { benchmark, runner })
    }

    fn parse_busy_policy(raw: &RawRunnerConfig) -> Result<BusyPolicy, HardValidationError> {
        match raw.busy_policy.as_str() {
            "reject" => Ok(BusyPolicy::Reject),
            "cancel_and_replace" => Ok(BusyPolicy::CancelAndReplace),
            "queue" => {
                if raw.queue_capacity == 0 || raw.queue_capacity > MAX_QUEUE_CAPACITY {
                    return Err(HardValidationError::InvalidFieldValue {
                        field: "queue_capacity",
                        value: raw.queue_capacity.to_string(),
                        reason: format!("Must be between 1 and {}", MAX_QUEUE_CAPACITY),
                    });
                }
                Ok(BusyPolicy::Queue {
                    capacity: raw.queue_capacity,
                })
            }
            other => Err(HardValidationError::UnknownVariant {
                field: "busy_policy",
                value: other.to_string(),
                expected: "reject, queue, cancel_and_replace",
            }),
        }
    }
}
