//! Prerequisite checks and the optional build step
//!
//! Runs before any snapshot exists, so failures here owe no cleanup.

use crate::config::HarnessConfig;
use crate::controller::HarnessError;
use crate::inspector;
use crate::probe::run_command;
use std::process::Command;
use std::time::Duration;
use tracing::{error, info, warn};

/// Verify the data file exists, the binary exists, and the data file opens.
///
/// Returns the number of tables found in the live file.
pub fn check(config: &HarnessConfig) -> Result<u64, HarnessError> {
    let database = &config.paths.database;
    if !database.exists() {
        error!("Data file not found at: {}", database.display());
        return Err(HarnessError::DatabaseNotFound(database.clone()));
    }
    info!("✓ Data file found");

    let binary = &config.paths.binary;
    if !binary.is_file() {
        warn!("CLI binary not found at: {}", binary.display());
        info!("Run with --build to build the CLI first");
        return Err(HarnessError::BinaryNotFound(binary.clone()));
    }
    info!("✓ CLI binary found");

    match inspector::table_count(database) {
        Ok(tables) => {
            info!("✓ Database accessible with {} tables", tables);
            Ok(tables)
        }
        Err(source) => {
            error!("Cannot access database: {}", source);
            Err(HarnessError::DatabaseUnreadable {
                path: database.clone(),
                source,
            })
        }
    }
}

/// Run the configured build command in the project root.
pub fn build_binary(config: &HarnessConfig, timeout: Duration) -> Result<(), HarnessError> {
    info!("Building CLI binary...");

    let mut command = Command::new(&config.build.program);
    command
        .args(&config.build.args)
        .current_dir(&config.paths.project_root);
    let display = std::iter::once(config.build.program.as_str())
        .chain(config.build.args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let result = run_command(command, display, timeout);
    if result.success {
        info!("✓ CLI built successfully");
        return Ok(());
    }

    let reason = if result.timed_out {
        format!("timed out after {:.0}s", timeout.as_secs_f64())
    } else {
        result.stderr.trim().to_string()
    };
    error!("Build failed: {}", reason);
    Err(HarnessError::BuildFailed(reason))
}
