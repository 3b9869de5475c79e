// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for guardbench.
//!
//! Every failure is an explicit enum variant. No `Box<dyn Error>`, no
//! `anyhow::Result` inside the library.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::RunnerState;
use crate::types::Phase;

/// Why a wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// `stop()` was requested by the host.
    Stopped,
    /// A newer run request replaced this one.
    Superseded,
}

impl AbortReason {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-level error type for a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Worker Pool Errors
    // =========================================================================
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Pool warm-up aborted ({reason}); pool discarded")]
    WarmupAborted { reason: AbortReason },

    // =========================================================================
    // Phase Errors
    // =========================================================================
    #[error("Phase {phase} aborted ({reason}); pool discarded")]
    PhaseAborted { phase: Phase, reason: AbortReason },

    #[error("Invariant violation in phase {phase}: {observed} read(s) observed an absent cell")]
    InvariantViolation { phase: Phase, observed: u64 },

    #[error("Phase {phase} failed: {failed} task(s) failed, first: {first}")]
    PhaseFailed {
        phase: Phase,
        failed: u64,
        first: String,
    },

    // =========================================================================
    // Runner Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Runner is busy ({state}); request rejected")]
    Busy { state: RunnerState },

    #[error("Run request superseded by a newer request before it started")]
    Superseded,
}

impl BenchError {
    /// The phase a failed run was in, if the failure belongs to a phase.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::PhaseAborted { phase, .. }
            | Self::InvariantViolation { phase, .. }
            | Self::PhaseFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Whether the error came from a cancelled wait rather than a fault.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Self::WarmupAborted { .. } | Self::PhaseAborted { .. } | Self::Superseded
        )
    }
}

/// Invalid input values. Rejected before any thread is spawned.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown option for {field}: {value} (expected one of: {expected})")]
    UnknownVariant {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Worker pool failures.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to spawn worker thread {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool is shut down; dispatch rejected")]
    ShutDown,

    #[error("Warm-up wait aborted ({reason})")]
    WarmupAborted { reason: AbortReason },
}

/// State transition errors for the runner state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition runner from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;
