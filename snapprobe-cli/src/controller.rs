//! Run Controller
//!
//! Drives one run through its states:
//!
//! ```text
//! Init -> PrereqsChecked -> (Built) -> SnapshotReady -> Analyzed -> Probed
//!      -> (Benchmarked) -> Reported -> CleanedUp
//! ```
//!
//! Failures before `SnapshotReady` are run-fatal and owe no cleanup. Once the
//! snapshot exists, every stage records its failures as report data, and the
//! snapshot is released on every exit path: normal return, error, interrupt,
//! or unwinding panic (through [`Snapshot`]'s `Drop`).

use crate::benchmark::{BenchmarkRunner, PERFORMANCE_PROBES};
use crate::config::{HarnessConfig, Timeouts};
use crate::inspector;
use crate::interrupt;
use crate::prereqs;
use crate::probe::{ProcessProbe, Probe};
use crate::snapshot::{resolve_source, Snapshot, SnapshotError};
use crate::suite;
use snapprobe_report::{render, OutputFormat, Outcome, RunReport, RunResults, SourceInfo};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

/// Run-fatal failures. Probe-local failures never appear here.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The live data file is missing
    #[error("Data file not found at {}", .0.display())]
    DatabaseNotFound(PathBuf),

    /// The binary under test is missing
    #[error("CLI binary not found at {} (run with --build to build it first)", .0.display())]
    BinaryNotFound(PathBuf),

    /// The live data file exists but SQLite cannot read it
    #[error("Cannot open data file {}: {source}", path.display())]
    DatabaseUnreadable {
        /// The live data file
        path: PathBuf,
        /// Error from SQLite
        #[source]
        source: rusqlite::Error,
    },

    /// The requested build did not succeed
    #[error("Build failed: {0}")]
    BuildFailed(String),

    /// A configuration value could not be used
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The snapshot could not be acquired
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// SIGINT or SIGTERM arrived during the run
    #[error("Interrupted by operator")]
    Interrupted,

    /// The report could not be rendered
    #[error("Failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),

    /// The report could not be written
    #[error("Failed to write report: {0}")]
    Io(#[from] io::Error),
}

impl HarnessError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Where a run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    /// Nothing checked yet
    Init,
    /// Data file and binary found, data file opens
    PrereqsChecked,
    /// Binary built, then prerequisites re-checked
    Built,
    /// Read-only copy in place
    SnapshotReady,
    /// Content inspection recorded
    Analyzed,
    /// Health, suite and server probes recorded
    Probed,
    /// Benchmarks recorded
    Benchmarked,
    /// Report rendered and written
    Reported,
    /// Snapshot released
    CleanedUp,
}

/// Per-run switches, usually straight from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Debug-level harness logs and `info` logs from the binary
    pub verbose: bool,
    /// Build the binary if the prerequisite check fails
    pub build: bool,
    /// Copy the newest backup instead of the live file
    pub use_backup: bool,
    /// Render the report as JSON
    pub json_output: bool,
    /// Run the benchmark catalog after the suite
    pub performance: bool,
    /// Draw a progress bar during benchmarks
    pub show_progress: bool,
}

/// Owns the configuration and state of one run
#[derive(Debug)]
pub struct RunController {
    config: HarnessConfig,
    options: RunOptions,
    timeouts: Timeouts,
    state: RunState,
}

impl RunController {
    /// Validate `config` and create a controller in [`RunState::Init`].
    pub fn new(config: HarnessConfig, options: RunOptions) -> Result<Self, HarnessError> {
        let timeouts = config
            .timeouts()
            .map_err(|e| HarnessError::Config(format!("{:#}", e)))?;
        Ok(Self {
            config,
            options,
            timeouts,
            state: RunState::Init,
        })
    }

    /// Latest state reached
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Configuration this run uses
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Check prerequisites, building the binary and re-checking once when
    /// `--build` was given.
    pub fn prepare(&mut self) -> Result<(), HarnessError> {
        info!("Checking prerequisites...");
        match prereqs::check(&self.config) {
            Ok(_) => {
                self.state = RunState::PrereqsChecked;
                Ok(())
            }
            Err(e) if self.options.build => {
                warn!("Prerequisite check failed ({}), building", e);
                if let Err(build_error) = prereqs::build_binary(&self.config, self.timeouts.build) {
                    if interrupt::requested() {
                        return Err(HarnessError::Interrupted);
                    }
                    return Err(build_error);
                }
                prereqs::check(&self.config)?;
                self.state = RunState::Built;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// [`prepare`](Self::prepare) followed by [`execute`](Self::execute).
    pub fn run(&mut self, out: &mut dyn Write) -> Result<RunReport, HarnessError> {
        self.prepare()?;
        self.execute(out)
    }

    /// Snapshot, probe the real binary, and write the rendered report to `out`.
    pub fn execute(&mut self, out: &mut dyn Write) -> Result<RunReport, HarnessError> {
        let verbose = self.options.verbose;
        let config = self.config.clone();
        self.execute_with(out, |snapshot| {
            ProcessProbe::for_snapshot(&config, snapshot.path(), verbose)
        })
    }

    /// Like [`execute`](Self::execute), with the probe built by `make_probe`
    /// once the snapshot exists.
    pub fn execute_with<P, F>(
        &mut self,
        out: &mut dyn Write,
        make_probe: F,
    ) -> Result<RunReport, HarnessError>
    where
        P: Probe,
        F: FnOnce(&Snapshot) -> P,
    {
        let paths = &self.config.paths;
        let (source, warning) = resolve_source(
            &paths.database,
            &paths.backup_dir,
            &paths.backup_file,
            self.options.use_backup,
        );
        let warnings: Vec<String> = warning.into_iter().collect();
        let parent = paths.temp_dir.clone().unwrap_or_else(std::env::temp_dir);

        let mut snapshot = Snapshot::acquire_in(&source, &parent)?;
        self.state = RunState::SnapshotReady;
        info!("Test database ready at {}", snapshot.path().display());

        let probe = make_probe(&snapshot);
        let outcome = self.probe_and_report(&snapshot, &probe, warnings, out);

        snapshot.release();
        self.state = RunState::CleanedUp;
        if let Err(e) = &outcome {
            error!("Run aborted: {}", e);
        }
        outcome
    }

    fn probe_and_report(
        &mut self,
        snapshot: &Snapshot,
        probe: &dyn Probe,
        warnings: Vec<String>,
        out: &mut dyn Write,
    ) -> Result<RunReport, HarnessError> {
        let mut results = RunResults::new();

        let analysis = inspector::inspect(snapshot.path(), &self.config.watch_list());
        results.insert("database_analysis", Outcome::Analysis(analysis));
        self.state = RunState::Analyzed;
        checkpoint(probe)?;

        let health = suite::run_health(probe, self.timeouts.probe);
        results.insert("health_check", Outcome::Probe(health));
        checkpoint(probe)?;

        let basic = suite::run_suite(probe, self.timeouts.probe);
        results.insert("basic_operations", Outcome::Suite(basic));
        checkpoint(probe)?;

        let server = suite::run_server_smoke(probe, &self.config.server, self.timeouts.server);
        results.insert(
            format!("{}_server", self.config.server.subcommand),
            Outcome::Server(server),
        );
        self.state = RunState::Probed;
        checkpoint(probe)?;

        if self.options.performance {
            let runner = BenchmarkRunner::new(self.config.runner.repetitions, self.timeouts.probe)
                .with_progress(self.options.show_progress);
            let stats = runner.run_all(probe, PERFORMANCE_PROBES);
            results.insert("performance", Outcome::Benchmarks(stats));
            self.state = RunState::Benchmarked;
            checkpoint(probe)?;
        }

        let source = snapshot.source();
        let report = RunReport::aggregate(
            snapshot.path().to_path_buf(),
            SourceInfo {
                path: source.path().to_path_buf(),
                from_backup: source.is_backup(),
            },
            warnings,
            results,
        );
        let rendered = render(&report, OutputFormat::from_json_flag(self.options.json_output))?;
        out.write_all(rendered.as_bytes())?;
        out.flush()?;
        self.state = RunState::Reported;
        Ok(report)
    }
}

fn checkpoint(probe: &dyn Probe) -> Result<(), HarnessError> {
    if probe.interrupted() {
        warn!("Interrupt received, stopping before the next stage");
        return Err(HarnessError::Interrupted);
    }
    Ok(())
}
