//! Human-readable Output
//!
//! One summary line per top-level result, marked with [`Outcome::reports_success`],
//! followed by indented detail lines.

use crate::report::{Analysis, BenchmarkStat, Outcome, RunReport, ServerOutcome};

const PASS: &str = "✓";
const FAIL: &str = "✗";

/// Format a report for terminal display
pub fn format_human_output(report: &RunReport) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("SnapProbe Test Report\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "Timestamp: {}\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S")
    ));
    output.push_str(&format!("Database: {}\n", report.database_path.display()));
    let origin = if report.source.from_backup {
        " (backup)"
    } else {
        ""
    };
    output.push_str(&format!(
        "Source: {}{}\n",
        report.source.path.display(),
        origin
    ));

    if !report.warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in &report.warnings {
            output.push_str(&format!("  ! {}\n", warning));
        }
    }

    output.push_str("\nResults Summary:\n");
    for (name, outcome) in report.results.iter() {
        let mark = if outcome.reports_success() { PASS } else { FAIL };
        output.push_str(&format!("  {} {}\n", mark, name));
        push_details(&mut output, outcome);
    }

    output
}

fn push_details(output: &mut String, outcome: &Outcome) {
    match outcome {
        Outcome::Probe(result) => {
            if result.success {
                output.push_str(&format!("      {:.3}s\n", result.duration));
            } else {
                output.push_str(&format!("      error: {}\n", result.error_line()));
            }
        }
        Outcome::Server(ServerOutcome::Started { note, duration, .. }) => {
            output.push_str(&format!("      {} ({:.1}s)\n", note, duration));
        }
        Outcome::Server(ServerOutcome::Failed(result)) => {
            output.push_str(&format!("      error: {}\n", result.error_line()));
        }
        Outcome::Suite(entries) => {
            for (name, result) in entries.iter() {
                if result.success {
                    output.push_str(&format!(
                        "      {} {} ({:.3}s)\n",
                        PASS, name, result.duration
                    ));
                } else {
                    output.push_str(&format!(
                        "      {} {}: {}\n",
                        FAIL,
                        name,
                        result.error_line()
                    ));
                }
            }
        }
        Outcome::Analysis(Analysis::Inspected { tables, counts }) => {
            output.push_str(&format!("      {} tables\n", tables.len()));
            for (entity, count) in counts {
                output.push_str(&format!("      {}: {} records\n", entity, count));
            }
        }
        Outcome::Analysis(Analysis::Failed { error }) => {
            output.push_str(&format!("      error: {}\n", error));
        }
        Outcome::Benchmarks(stats) => {
            for (name, stat) in stats.iter() {
                match stat {
                    BenchmarkStat::Measured {
                        avg_duration,
                        min_duration,
                        max_duration,
                        runs,
                    } => output.push_str(&format!(
                        "      {}: avg {:.3}s (min: {:.3}s, max: {:.3}s, runs: {})\n",
                        name, avg_duration, min_duration, max_duration, runs
                    )),
                    BenchmarkStat::Failed { error, failed_run } => output.push_str(&format!(
                        "      {}: failed on run {}: {}\n",
                        name, failed_run, error
                    )),
                }
            }
        }
    }
}
