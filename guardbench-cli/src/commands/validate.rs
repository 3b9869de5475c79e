// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `guardbench validate` command - Validate configuration file.

use std::path::Path;

use guardbench_core::{BusyPolicy, ConfigLoader};

pub async fn execute(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file.display(), "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Benchmark:");
            println!("  Workers:        {}", config.benchmark.worker_count);
            println!("  Iterations:     {}", config.benchmark.iteration_count);
            println!();
            println!("Runner:");
            let policy = match config.runner.busy_policy {
                BusyPolicy::Reject => "reject".to_string(),
                BusyPolicy::Queue { capacity } => format!("queue (capacity {})", capacity),
                BusyPolicy::CancelAndReplace => "cancel_and_replace".to_string(),
            };
            println!("  Busy Policy:    {}", policy);
            println!("  Drain:          {:?}", config.runner.drain);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
