#![warn(missing_docs)]
//! SnapProbe CLI Library
//!
//! Runs the integration harness against an external CLI binary: copies its
//! data file into a disposable read-only snapshot, probes the binary against
//! the copy, and reports the results. Use `snapprobe::run()` (or
//! `snapprobe_cli::run()`) from a `main` function.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     if let Err(e) = snapprobe_cli::run() {
//!         eprintln!("Error: {e:#}");
//!         std::process::exit(snapprobe_cli::exit_code(&e));
//!     }
//! }
//! ```

mod benchmark;
mod config;
mod controller;
mod inspector;
pub mod interrupt;
mod prereqs;
mod probe;
mod snapshot;
mod suite;

pub use benchmark::{benchmark, BenchmarkRunner, PERFORMANCE_PROBES};
pub use config::*;
pub use controller::{HarnessError, RunController, RunOptions, RunState};
pub use inspector::{inspect, open_read_only, table_count};
pub use probe::{run_command, ProcessProbe, Probe};
pub use snapshot::{
    latest_backup, resolve_source, DataSource, Snapshot, SnapshotError, SNAPSHOT_FILE_NAME,
};
pub use suite::{
    run_catalog, run_health, run_server_smoke, run_suite, server_started, ParsedOutput,
    BASIC_OPERATIONS, HEALTH_ARGS,
};

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable that replaces the computed log filter
pub const LOG_ENV_VAR: &str = "SNAPPROBE_LOG";

/// SnapProbe CLI arguments
#[derive(Parser, Debug)]
#[command(name = "snapprobe")]
#[command(
    author,
    version,
    about = "SnapProbe - safe integration tests for a CLI against a snapshot of its data"
)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Build the binary first if it is missing
    #[arg(long)]
    pub build: bool,

    /// Test against the newest backup instead of the live data file
    #[arg(long, alias = "backup")]
    pub backup_test: bool,

    /// Print the report as JSON
    #[arg(long, alias = "json")]
    pub json_output: bool,

    /// Also benchmark the listing queries
    #[arg(long)]
    pub performance: bool,

    /// Configuration file (default: snapprobe.toml found by walking up)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Live data file
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Binary under test
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Root directory holding one subdirectory per backup
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Repetitions per benchmarked probe
    #[arg(long)]
    pub repetitions: Option<usize>,

    /// Time budget per probe in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print a default snapprobe.toml and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Per-run switches carried by these arguments.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            verbose: self.verbose,
            build: self.build,
            use_backup: self.backup_test,
            json_output: self.json_output,
            performance: self.performance,
            show_progress: !self.json_output,
        }
    }
}

/// Run the SnapProbe CLI with the process arguments.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the SnapProbe CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.print_config {
        print!("{}", HarnessConfig::default_toml());
        return Ok(());
    }

    init_logging(&cli);
    interrupt::install()?;

    let config = load_config(&cli)?;
    let mut controller = RunController::new(config, cli.run_options())?;
    tracing::info!("Starting integration tests");

    match cli.output {
        Some(ref path) => {
            let mut buffer = Vec::new();
            controller.run(&mut buffer)?;
            let mut file = std::fs::File::create(path)?;
            file.write_all(&buffer)?;
            eprintln!("Report written to: {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            controller.run(&mut lock)?;
        }
    }

    Ok(())
}

/// Process exit status for an error returned by [`run`].
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<HarnessError>()
        .map_or(1, HarnessError::exit_code)
}

fn init_logging(cli: &Cli) {
    let filter = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| {
            let level = if cli.verbose {
                "debug"
            } else if cli.json_output {
                "warn"
            } else {
                "info"
            };
            EnvFilter::new(format!("snapprobe={level},snapprobe_cli={level}"))
        });

    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Layer configuration: defaults, then the config file, then CLI flags.
fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = match cli.config {
        Some(ref path) => HarnessConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
        None => HarnessConfig::discover().unwrap_or_default(),
    };

    if let Some(ref database) = cli.database {
        config.paths.database = database.clone();
    }
    if let Some(ref binary) = cli.binary {
        config.paths.binary = binary.clone();
    }
    if let Some(ref backup_dir) = cli.backup_dir {
        config.paths.backup_dir = backup_dir.clone();
    }
    if let Some(repetitions) = cli.repetitions {
        config.runner.repetitions = repetitions;
    }
    if let Some(secs) = cli.timeout {
        config.runner.probe_timeout = format!("{}s", secs);
    }

    Ok(config)
}
