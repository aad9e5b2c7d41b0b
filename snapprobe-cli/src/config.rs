//! Configuration loading from snapprobe.toml
//!
//! Every path and limit the harness uses lives here, so a run can be pointed at
//! any data file, binary, or backup tree. The configuration is discovered by
//! walking up from the current directory; CLI flags override it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up by [`HarnessConfig::discover`]
pub const CONFIG_FILE_NAME: &str = "snapprobe.toml";

const THINGS_GROUP_CONTAINER: &str =
    "Library/Group Containers/JLMPQHK86H.com.culturedcode.ThingsMac/ThingsData-0Z0Z2";

/// SnapProbe configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Time budgets and repetition counts
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Environment handed to the external binary
    #[serde(default)]
    pub env: EnvConfig,
    /// Server-mode smoke test
    #[serde(default)]
    pub server: ServerConfig,
    /// Direct content inspection
    #[serde(default)]
    pub inspect: InspectConfig,
    /// Optional pre-build of the external binary
    #[serde(default)]
    pub build: BuildConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Live data file (never opened for writing)
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// External binary under test
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Root holding one subdirectory per backup
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    /// Data file name inside each backup subdirectory
    #[serde(default = "default_backup_file")]
    pub backup_file: String,
    /// Working directory for the build command
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Parent of the snapshot's temporary directory (system temp dir if unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            binary: default_binary(),
            backup_dir: default_backup_dir(),
            backup_file: default_backup_file(),
            project_root: default_project_root(),
            temp_dir: None,
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}
fn default_database() -> PathBuf {
    home_dir()
        .join(THINGS_GROUP_CONTAINER)
        .join("Things Database.thingsdatabase")
        .join("main.sqlite")
}
fn default_binary() -> PathBuf {
    PathBuf::from("target/release/things3")
}
fn default_backup_dir() -> PathBuf {
    home_dir().join(THINGS_GROUP_CONTAINER).join("Backups")
}
fn default_backup_file() -> String {
    "main.sqlite".to_string()
}
fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

/// Time budgets and repetition counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Budget for a listing or health probe (e.g., "30s")
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: String,
    /// Window the server-mode smoke test is allowed to run
    #[serde(default = "default_server_timeout")]
    pub server_timeout: String,
    /// Budget for the optional build step
    #[serde(default = "default_build_timeout")]
    pub build_timeout: String,
    /// Repetitions per benchmarked probe
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            server_timeout: default_server_timeout(),
            build_timeout: default_build_timeout(),
            repetitions: default_repetitions(),
        }
    }
}

fn default_probe_timeout() -> String {
    "30s".to_string()
}
fn default_server_timeout() -> String {
    "5s".to_string()
}
fn default_build_timeout() -> String {
    "300s".to_string()
}
fn default_repetitions() -> usize {
    3
}

/// Environment variable names understood by the external binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Variable pointing the binary at its data file
    #[serde(default = "default_data_source_var")]
    pub data_source_var: String,
    /// Variable controlling the binary's log verbosity
    #[serde(default = "default_log_level_var")]
    pub log_level_var: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            data_source_var: default_data_source_var(),
            log_level_var: default_log_level_var(),
        }
    }
}

fn default_data_source_var() -> String {
    "THINGS_DB_PATH".to_string()
}
fn default_log_level_var() -> String {
    "RUST_LOG".to_string()
}

/// Server-mode smoke test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Subcommand that starts the long-running server
    #[serde(default = "default_server_subcommand")]
    pub subcommand: String,
    /// Phrase searched for (case-insensitively) in stderr
    #[serde(default = "default_startup_phrase")]
    pub startup_phrase: String,
    /// Fraction of the window the server must survive to pass without the phrase
    #[serde(default = "default_survival_ratio")]
    pub survival_ratio: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            subcommand: default_server_subcommand(),
            startup_phrase: default_startup_phrase(),
            survival_ratio: default_survival_ratio(),
        }
    }
}

fn default_server_subcommand() -> String {
    "mcp".to_string()
}
fn default_startup_phrase() -> String {
    "server started".to_string()
}
fn default_survival_ratio() -> f64 {
    0.8
}

/// Direct content inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectConfig {
    /// Watched tables: entity name -> table name
    #[serde(default = "default_watch_tables")]
    pub tables: BTreeMap<String, String>,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            tables: default_watch_tables(),
        }
    }
}

fn default_watch_tables() -> BTreeMap<String, String> {
    [
        ("tasks", "TMTask"),
        ("projects", "TMProject"),
        ("areas", "TMArea"),
        ("tags", "TMTag"),
    ]
    .into_iter()
    .map(|(entity, table)| (entity.to_string(), table.to_string()))
    .collect()
}

/// Build command for `--build`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program to run
    #[serde(default = "default_build_program")]
    pub program: String,
    /// Arguments passed to `program`
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            args: default_build_args(),
        }
    }
}

fn default_build_program() -> String {
    "cargo".to_string()
}
fn default_build_args() -> Vec<String> {
    vec!["build".to_string(), "--release".to_string()]
}

/// Time budgets resolved from their string form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    /// Budget for each health or listing probe
    pub probe: Duration,
    /// Window for the server-mode smoke test
    pub server: Duration,
    /// Budget for the build command
    pub build: Duration,
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Parse every duration string up front so a typo fails the run before
    /// anything is copied.
    pub fn timeouts(&self) -> anyhow::Result<Timeouts> {
        let parse = |name: &str, value: &str| {
            Self::parse_duration(value)
                .map(Duration::from_nanos)
                .map_err(|e| anyhow::anyhow!("runner.{}: {}", name, e))
        };
        Ok(Timeouts {
            probe: parse("probe_timeout", &self.runner.probe_timeout)?,
            server: parse("server_timeout", &self.runner.server_timeout)?,
            build: parse("build_timeout", &self.runner.build_timeout)?,
        })
    }

    /// Watched tables as `(entity, table)` pairs
    pub fn watch_list(&self) -> Vec<(String, String)> {
        self.inspect
            .tables
            .iter()
            .map(|(entity, table)| (entity.clone(), table.clone()))
            .collect()
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# SnapProbe Configuration

[paths]
# Live data file. It is only ever copied, never opened for writing.
# database = "/Users/me/Library/Group Containers/.../main.sqlite"
# External binary under test
binary = "target/release/things3"
# One subdirectory per backup, each holding `backup_file`
# backup_dir = "/Users/me/Library/Group Containers/.../Backups"
backup_file = "main.sqlite"
# Working directory for --build
project_root = "."
# Parent directory for the snapshot (defaults to the system temp dir)
# temp_dir = "/tmp"

[runner]
# Budget for each listing and health probe
probe_timeout = "30s"
# Window for the server-mode smoke test
server_timeout = "5s"
# Budget for the build command
build_timeout = "300s"
# Repetitions per benchmarked probe (--performance)
repetitions = 3

[env]
data_source_var = "THINGS_DB_PATH"
log_level_var = "RUST_LOG"

[server]
subcommand = "mcp"
# Matched case-insensitively against stderr
startup_phrase = "server started"
# Surviving this fraction of server_timeout also counts as started
survival_ratio = 0.8

[inspect.tables]
tasks = "TMTask"
projects = "TMProject"
areas = "TMArea"
tags = "TMTag"

[build]
program = "cargo"
args = ["build", "--release"]
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if value < 0.0 || !value.is_finite() {
            return Err(anyhow::anyhow!("Invalid duration number: {}", num_part));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.runner.probe_timeout, "30s");
        assert_eq!(config.runner.server_timeout, "5s");
        assert_eq!(config.runner.repetitions, 3);
        assert_eq!(config.env.data_source_var, "THINGS_DB_PATH");
        assert_eq!(config.server.subcommand, "mcp");
        assert_eq!(config.inspect.tables.get("tasks").unwrap(), "TMTask");
        assert!(config.paths.database.ends_with("main.sqlite"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(HarnessConfig::parse_duration("3s").unwrap(), 3_000_000_000);
        assert_eq!(HarnessConfig::parse_duration("500ms").unwrap(), 500_000_000);
        assert_eq!(HarnessConfig::parse_duration("100us").unwrap(), 100_000);
        assert_eq!(HarnessConfig::parse_duration("2m").unwrap(), 120_000_000_000);
        assert_eq!(HarnessConfig::parse_duration("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(HarnessConfig::parse_duration("30").unwrap(), 30_000_000_000);
        assert!(HarnessConfig::parse_duration("").is_err());
        assert!(HarnessConfig::parse_duration("5h").is_err());
        assert!(HarnessConfig::parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [paths]
            binary = "/opt/things3"

            [runner]
            server_timeout = "2s"

            [inspect.tables]
            tasks = "Task"
        "#;

        let config: HarnessConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.paths.binary, PathBuf::from("/opt/things3"));
        assert_eq!(config.runner.server_timeout, "2s");
        assert_eq!(config.watch_list(), vec![("tasks".to_string(), "Task".to_string())]);
        // Defaults should still apply
        assert_eq!(config.runner.probe_timeout, "30s");
        assert_eq!(config.paths.backup_file, "main.sqlite");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: HarnessConfig = toml::from_str(&HarnessConfig::default_toml()).unwrap();
        assert_eq!(config.runner.build_timeout, "300s");
        assert_eq!(config.inspect.tables.len(), 4);
        assert_eq!(config.build.args, vec!["build", "--release"]);
    }

    #[test]
    fn test_timeouts_reject_bad_strings() {
        let mut config = HarnessConfig::default();
        let timeouts = config.timeouts().unwrap();
        assert_eq!(timeouts.server, Duration::from_secs(5));

        config.runner.probe_timeout = "soon".to_string();
        let err = config.timeouts().unwrap_err().to_string();
        assert!(err.contains("probe_timeout"));
    }
}
