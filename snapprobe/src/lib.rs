#![warn(missing_docs)]
//! # SnapProbe
//!
//! Integration harness for a command-line tool that reads an irreplaceable
//! SQLite data file. Every run works on a disposable copy:
//!
//! - **Snapshot isolation**: the data file (or its newest backup) is copied
//!   into a fresh temporary directory and marked read-only; the original is
//!   only ever read
//! - **Contained probes**: each invocation of the binary is time-boxed, and a
//!   crash, timeout or bad subcommand becomes result data instead of aborting
//!   the run
//! - **Content inspection**: table list and row counts read straight from the
//!   copy, independent of the binary
//! - **Benchmarks**: optional repeated timing of the listing queries
//! - **Reports**: human summary or full JSON
//! - **Guaranteed cleanup**: the copy and its directory are gone when the run
//!   ends, however it ends
//!
//! ## Quick Start
//!
//! ```ignore
//! fn main() {
//!     if let Err(e) = snapprobe::run() {
//!         eprintln!("Error: {e:#}");
//!         std::process::exit(snapprobe::exit_code(&e));
//!     }
//! }
//! ```
//!
//! ## Embedding
//!
//! ```ignore
//! use snapprobe::{HarnessConfig, RunController, RunOptions};
//!
//! let mut config = HarnessConfig::default();
//! config.paths.database = "/path/to/main.sqlite".into();
//! let mut controller = RunController::new(config, RunOptions::default())?;
//! let report = controller.run(&mut std::io::stdout())?;
//! ```

// Re-export the harness
pub use snapprobe_cli::{
    benchmark, inspect, resolve_source, run_command, BenchmarkRunner, Cli, DataSource,
    HarnessConfig, HarnessError, ParsedOutput, ProcessProbe, Probe, RunController, RunOptions,
    RunState, Snapshot, SnapshotError,
};

// Re-export the result model
pub use snapprobe_report::{
    render, Analysis, BenchmarkStat, NamedResults, OutputFormat, Outcome, ProbeResult,
    RunReport, ServerOutcome, SourceInfo,
};

/// Run the SnapProbe CLI harness.
///
/// Call this from a binary's `main()`:
/// ```ignore
/// fn main() {
///     snapprobe::run().unwrap();
/// }
/// ```
pub use snapprobe_cli::run;

/// Exit status for an error returned by [`run`]
pub use snapprobe_cli::exit_code;
