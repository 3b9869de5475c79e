// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! guardbench CLI
//!
//! Triggers benchmark runs comparing a reader/writer lock against an
//! exclusive monitor on a warmed worker pool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// guardbench - reader/writer lock vs. monitor contention benchmark
#[derive(Parser)]
#[command(name = "guardbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the benchmark (Ctrl-C stops the in-flight run)
    Run {
        /// Number of worker threads [default: logical CPUs]
        #[arg(short, long)]
        workers: Option<usize>,

        /// Guarded reads per phase [default: 1000000]
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Configuration file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of sequential runs
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,

        /// Write a JSON report into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            workers,
            iterations,
            config,
            repeat,
            output,
        } => {
            let args = commands::run::RunArgs {
                workers,
                iterations,
                config,
                repeat,
                output,
            };
            commands::run::execute(args).await
        }
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
