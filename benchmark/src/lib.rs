// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! guardbench Reporting
//!
//! Persists benchmark runs as JSON together with the host they ran on, and
//! hosts the criterion benches for the two guard strategies.
//!
//! # Data Output
//!
//! Each saved report holds every run of one invocation, with one elapsed
//! time per phase (`rwlock`, `mutex`).

pub mod metrics;
pub mod reporter;

pub use metrics::{BenchmarkReport, SystemInfo};
pub use reporter::{JsonReporter, ReporterError};
