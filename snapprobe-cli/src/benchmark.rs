//! Benchmark Runner
//!
//! Repeats selected probes sequentially and reduces their wall-clock times to
//! [`BenchmarkStat`]s. Repetitions never overlap, so one run cannot skew
//! another's timing. A series is all-or-nothing: the first failing repetition
//! ends it and the earlier successful timings are dropped.

use crate::probe::Probe;
use indicatif::{ProgressBar, ProgressStyle};
use snapprobe_report::{BenchmarkStat, NamedResults};
use std::time::Duration;
use tracing::{error, info, warn};

/// Probes timed by `--performance`, in execution order
pub const PERFORMANCE_PROBES: &[(&[&str], &str)] = &[
    (&["inbox"], "inbox_query"),
    (&["projects"], "projects_query"),
    (&["areas"], "areas_query"),
    (&["health"], "health_check"),
];

/// Time `repetitions` consecutive runs of `args`.
pub fn benchmark(
    probe: &dyn Probe,
    args: &[&str],
    name: &str,
    repetitions: usize,
    timeout: Duration,
) -> BenchmarkStat {
    let mut durations = Vec::with_capacity(repetitions);

    for run in 1..=repetitions {
        if probe.interrupted() {
            return BenchmarkStat::Failed {
                error: "Interrupted".to_string(),
                failed_run: run,
            };
        }
        let result = probe.run(args, timeout);
        if !result.success {
            warn!("{}: run {} of {} failed", name, run, repetitions);
            return BenchmarkStat::Failed {
                error: format!(
                    "Run {} of {} failed: {}",
                    run,
                    repetitions,
                    result.error_line()
                ),
                failed_run: run,
            };
        }
        durations.push(result.duration);
    }

    BenchmarkStat::from_durations(&durations).unwrap_or(BenchmarkStat::Failed {
        error: "No repetitions requested".to_string(),
        failed_run: 0,
    })
}

/// Runs a benchmark catalog with a fixed repetition count and time budget
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    repetitions: usize,
    timeout: Duration,
    show_progress: bool,
}

impl BenchmarkRunner {
    /// Runner with at least one repetition per entry.
    pub fn new(repetitions: usize, timeout: Duration) -> Self {
        Self {
            repetitions: repetitions.max(1),
            timeout,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while running.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Repetitions per entry
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Benchmark every catalog entry. Entries are independent: a failed
    /// series is recorded and the next entry still runs.
    pub fn run_all(
        &self,
        probe: &dyn Probe,
        catalog: &[(&[&str], &str)],
    ) -> NamedResults<BenchmarkStat> {
        info!("Running performance tests...");

        let pb = if self.show_progress {
            let pb = ProgressBar::new((catalog.len() * self.repetitions) as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut results = NamedResults::new();
        for (args, name) in catalog {
            if probe.interrupted() {
                break;
            }
            pb.set_message(name.to_string());

            let stat = benchmark(probe, args, name, self.repetitions, self.timeout);
            match &stat {
                BenchmarkStat::Measured {
                    avg_duration,
                    min_duration,
                    max_duration,
                    ..
                } => info!(
                    "✓ {}: avg {:.3}s (min: {:.3}s, max: {:.3}s)",
                    name, avg_duration, min_duration, max_duration
                ),
                BenchmarkStat::Failed { error, .. } => error!("✗ {}: {}", name, error),
            }
            results.insert(*name, stat);
            pb.inc(self.repetitions as u64);
        }

        pb.finish_and_clear();
        results
    }
}
