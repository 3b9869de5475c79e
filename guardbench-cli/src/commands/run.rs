// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `guardbench run` command - Run the benchmark.
//!
//! Each run executes on a blocking task; Ctrl-C maps to `stop()` on the
//! runner and ends the invocation after the aborted run unwinds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use guardbench_benchmark::{BenchmarkReport, JsonReporter};
use guardbench_core::timing::format_nanos;
use guardbench_core::{
    BenchResult, BenchmarkRunner, Config, ConfigLoader, IterationCount, RunParams, RunReport,
    WorkerCount,
};
use tokio::task::JoinHandle;

pub struct RunArgs {
    pub workers: Option<usize>,
    pub iterations: Option<u64>,
    pub config: Option<PathBuf>,
    pub repeat: u32,
    pub output: Option<PathBuf>,
}

fn resolve(args: &RunArgs) -> Result<(Config, RunParams), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load_file(path)?,
        None => Config::default(),
    };

    let worker_count = match args.workers {
        Some(count) => WorkerCount::new(count)?,
        None => config.benchmark.worker_count,
    };
    let iteration_count = args
        .iterations
        .map(IterationCount::new)
        .unwrap_or(config.benchmark.iteration_count);

    Ok((
        config,
        RunParams {
            worker_count,
            iteration_count,
        },
    ))
}

fn print_run(index: u32, report: &RunReport) {
    println!(
        "✓ Run {} ({} workers, {} iterations)",
        index + 1,
        report.worker_count,
        report.iteration_count
    );
    for record in [&report.rwlock, &report.mutex] {
        println!(
            "  {:<8} {:>12} ({} ns)",
            record.phase,
            format_nanos(record.elapsed_nanos),
            record.elapsed_nanos
        );
    }
}

/// How often an interrupt retries `stop()` while the run is not yet admitted.
const STOP_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Stop the run behind `task`, retrying until the runner has admitted it or
/// the task has already finished.
async fn stop_when_admitted(
    runner: &BenchmarkRunner,
    task: &JoinHandle<BenchResult<RunReport>>,
) {
    while !runner.stop() && !task.is_finished() {
        tokio::time::sleep(STOP_RETRY_INTERVAL).await;
    }
}

pub async fn execute(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (config, params) = resolve(&args)?;
    let runner = Arc::new(BenchmarkRunner::new(config.runner));
    let mut report = args.output.as_ref().map(|_| BenchmarkReport::new());

    tracing::info!(
        worker_count = params.worker_count.get(),
        iteration_count = params.iteration_count.get(),
        repeat = args.repeat,
        "Starting benchmark"
    );

    for index in 0..args.repeat {
        let mut task = tokio::task::spawn_blocking({
            let runner = Arc::clone(&runner);
            move || runner.run(params)
        });

        let mut interrupted = false;
        let result = tokio::select! {
            joined = &mut task => joined?,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                stop_when_admitted(&runner, &task).await;
                task.await?
            }
        };

        match result {
            Ok(run) => {
                print_run(index, &run);
                if let Some(report) = report.as_mut() {
                    report.add_run(run);
                }
                if interrupted {
                    break;
                }
            }
            Err(err) if err.is_abort() => {
                let phase = err.phase().map(|p| p.name()).unwrap_or("warm-up");
                eprintln!("✗ Run {} aborted during {}: {}", index + 1, phase, err);
                break;
            }
            Err(err) => {
                let phase = err.phase().map(|p| p.name()).unwrap_or("setup");
                eprintln!("✗ Run {} failed during {}: {}", index + 1, phase, err);
                return Err(err.into());
            }
        }
    }

    if let (Some(report), Some(dir)) = (report, args.output.as_ref()) {
        let reporter = JsonReporter::new(dir)?;
        let path = reporter.save(&report)?;
        println!();
        println!("Report saved to: {}", path.display());
    }

    Ok(())
}
