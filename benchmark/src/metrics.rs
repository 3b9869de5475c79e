// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Report types for benchmark runs.
//!
//! A report is one or more [`RunReport`]s plus the host they ran on. Each run
//! carries exactly one elapsed time per phase; nothing is aggregated here.

use chrono::{DateTime, Utc};
use guardbench_core::RunReport;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// System information captured at benchmark time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name
    pub os: String,
    /// OS version
    pub os_version: String,
    /// Kernel version (Linux)
    pub kernel_version: Option<String>,
    /// CPU model name
    pub cpu_model: String,
    /// Number of logical CPUs
    pub cpu_cores: usize,
    /// Total system memory in bytes
    pub memory_bytes: u64,
    /// Hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Collect current system information.
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version(),
            cpu_model: sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: sys.cpus().len(),
            memory_bytes: sys.total_memory(),
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// All runs from one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Suite identifier
    pub benchmark_suite: String,
    /// Framework version
    pub version: String,
    /// Timestamp when the report was started
    pub timestamp: DateTime<Utc>,
    /// System information
    pub system_info: SystemInfo,
    /// Completed runs, in execution order
    pub runs: Vec<RunReport>,
}

impl BenchmarkReport {
    /// Create a new, empty report.
    pub fn new() -> Self {
        Self {
            benchmark_suite: "guardbench".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            system_info: SystemInfo::collect(),
            runs: Vec::new(),
        }
    }

    /// Add a completed run to the report.
    pub fn add_run(&mut self, run: RunReport) {
        self.runs.push(run);
    }
}

impl Default for BenchmarkReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardbench_core::{BenchmarkRunner, RunParams};

    #[test]
    fn test_system_info_collect() {
        let info = SystemInfo::collect();
        assert!(!info.os.is_empty());
        assert!(info.cpu_cores > 0);
        assert!(info.memory_bytes > 0);
    }

    #[test]
    fn test_report_serialization() {
        let runner = BenchmarkRunner::default();
        let run = runner.run(RunParams::new(2, 100).unwrap()).unwrap();

        let mut report = BenchmarkReport::new();
        report.add_run(run);

        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("guardbench"));
        assert!(json.contains("\"rwlock\""));
        assert!(json.contains("\"iteration_count\": 100"));
        assert!(json.contains("system_info"));
    }
}
