//! Report Data Structures
//!
//! Every value here is produced once and never mutated after it is bound into
//! [`RunResults`]. Failures are data: a broken probe is a [`ProbeResult`] with
//! `success: false`, a broken inspection is [`Analysis::Failed`], and a broken
//! benchmark is [`BenchmarkStat::Failed`].

use chrono::{DateTime, Local};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Outcome of one invocation of the external binary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    /// Exit status was zero and the probe finished inside its time budget
    pub success: bool,
    /// Captured standard output, lossily decoded
    pub stdout: String,
    /// Captured standard error, with any harness message appended
    pub stderr: String,
    /// Wall-clock seconds (the timeout value itself when the probe timed out)
    pub duration: f64,
    /// Argument vector joined with spaces, binary path omitted
    pub command: String,
    /// Exit status, `None` when the process never exited on its own
    pub exit_code: Option<i32>,
    /// Killed for exceeding its time budget
    pub timed_out: bool,
}

impl ProbeResult {
    /// A probe that never produced an exit status (spawn error, interrupt).
    pub fn failed(command: impl Into<String>, message: impl Into<String>, duration: f64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            duration,
            command: command.into(),
            exit_code: None,
            timed_out: false,
        }
    }

    /// First non-empty line of stderr, for one-line summaries.
    pub fn error_line(&self) -> &str {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no error output")
    }
}

/// Insertion-ordered `name -> value` mapping, serialized as a JSON object.
///
/// Catalog order is preserved so reports are reproducible run to run.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedResults<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for NamedResults<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> NamedResults<V> {
    /// Empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under `name`. Rebinding an existing name replaces the
    /// value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: V) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Value bound under `name`
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry has been bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for NamedResults<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Server-mode smoke test outcome.
///
/// Passing only means the server announced itself or stayed up for most of
/// its window. It says nothing about protocol correctness.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerOutcome {
    /// Announced itself or survived its window
    Started {
        /// Always `true`; lets the summary treat this like a probe result
        success: bool,
        /// What was (and was not) verified
        note: String,
        /// Seconds the server ran
        duration: f64,
    },
    /// Died early without announcing itself
    Failed(ProbeResult),
}

impl ServerOutcome {
    /// A passing outcome with `success: true`.
    pub fn started(note: impl Into<String>, duration: f64) -> Self {
        ServerOutcome::Started {
            success: true,
            note: note.into(),
            duration,
        }
    }

    /// Whether the server counts as started.
    pub fn is_success(&self) -> bool {
        match self {
            ServerOutcome::Started { success, .. } => *success,
            ServerOutcome::Failed(result) => result.success,
        }
    }
}

/// Direct read-only inspection of the snapshot file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    /// The file opened and every query succeeded
    Inspected {
        /// All table names, sorted
        tables: Vec<String>,
        /// Row counts keyed by entity name, for watched tables that exist
        counts: BTreeMap<String, u64>,
    },
    /// Open or query failure; no partial counts
    Failed {
        /// Error message from SQLite
        error: String,
    },
}

/// Latency statistics for one benchmarked probe
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BenchmarkStat {
    /// Every repetition succeeded
    Measured {
        /// Mean seconds per run
        avg_duration: f64,
        /// Fastest run in seconds
        min_duration: f64,
        /// Slowest run in seconds
        max_duration: f64,
        /// Number of repetitions
        runs: usize,
    },
    /// A repetition failed; earlier successful runs are discarded.
    Failed {
        /// Why the failing repetition failed
        error: String,
        /// 1-based index of the repetition that failed
        failed_run: usize,
    },
}

impl BenchmarkStat {
    /// Statistics over the durations of a fully successful series.
    ///
    /// Returns `None` for an empty series.
    pub fn from_durations(durations: &[f64]) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        let sum: f64 = durations.iter().sum();
        let min = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let max = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(BenchmarkStat::Measured {
            avg_duration: sum / durations.len() as f64,
            min_duration: min,
            max_duration: max,
            runs: durations.len(),
        })
    }

    /// Whether the series completed.
    pub fn is_measured(&self) -> bool {
        matches!(self, BenchmarkStat::Measured { .. })
    }
}

/// Anything bound at the top level of [`RunResults`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// A single probe, such as the health check
    Probe(ProbeResult),
    /// The server-mode smoke test
    Server(ServerOutcome),
    /// An ordered set of probes keyed by display name
    Suite(NamedResults<ProbeResult>),
    /// Direct content inspection
    Analysis(Analysis),
    /// Benchmark statistics keyed by benchmark name
    Benchmarks(NamedResults<BenchmarkStat>),
}

impl Outcome {
    /// Summary-line verdict: only outcomes that serialize to a mapping with
    /// `success: true` count as passed. Suites, analyses and benchmark tables
    /// carry no such key and are always shown as failed, even when every
    /// entry inside them succeeded.
    pub fn reports_success(&self) -> bool {
        match self {
            Outcome::Probe(result) => result.success,
            Outcome::Server(server) => server.is_success(),
            Outcome::Suite(_) | Outcome::Analysis(_) | Outcome::Benchmarks(_) => false,
        }
    }
}

/// Top-level results mapping of a run
pub type RunResults = NamedResults<Outcome>;

/// Where the snapshot was copied from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// File the snapshot was copied from
    pub path: PathBuf,
    /// Whether that file is a backup rather than the live data
    pub from_backup: bool,
}

/// Complete report of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the report was aggregated
    pub timestamp: DateTime<Local>,
    /// Path of the disposable snapshot every probe ran against
    pub database_path: PathBuf,
    /// Where the snapshot came from
    pub source: SourceInfo,
    /// Non-fatal problems, such as a missing backup
    pub warnings: Vec<String>,
    /// Every recorded outcome, in stage order
    pub results: RunResults,
}

impl RunReport {
    /// Finalize collected results into a report stamped with the current time.
    pub fn aggregate(
        database_path: PathBuf,
        source: SourceInfo,
        warnings: Vec<String>,
        results: RunResults,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            database_path,
            source,
            warnings,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(success: bool) -> ProbeResult {
        ProbeResult {
            success,
            stdout: "[]".to_string(),
            stderr: String::new(),
            duration: 0.01,
            command: "areas".to_string(),
            exit_code: Some(if success { 0 } else { 1 }),
            timed_out: false,
        }
    }

    #[test]
    fn named_results_keep_insertion_order() {
        let mut results = NamedResults::new();
        results.insert("zeta", 1);
        results.insert("alpha", 2);
        results.insert("mid", 3);
        assert_eq!(results.names().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);

        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":2,"mid":3}"#);
    }

    #[test]
    fn rebinding_a_name_replaces_in_place() {
        let mut results = NamedResults::new();
        results.insert("a", 1);
        results.insert("b", 2);
        results.insert("a", 9);
        assert_eq!(results.len(), 2);
        assert_eq!(results.get("a"), Some(&9));
        assert_eq!(results.names().next(), Some("a"));
    }

    #[test]
    fn only_success_mappings_pass_the_summary() {
        assert!(Outcome::Probe(probe(true)).reports_success());
        assert!(!Outcome::Probe(probe(false)).reports_success());
        assert!(Outcome::Server(ServerOutcome::started("up", 5.0)).reports_success());
        assert!(!Outcome::Server(ServerOutcome::Failed(probe(false))).reports_success());

        let mut suite = NamedResults::new();
        suite.insert("areas", probe(true));
        assert!(!Outcome::Suite(suite).reports_success());

        let analysis = Analysis::Inspected {
            tables: vec!["TMTask".to_string()],
            counts: BTreeMap::from([("tasks".to_string(), 3)]),
        };
        assert!(!Outcome::Analysis(analysis).reports_success());

        let mut benches = NamedResults::new();
        benches.insert("areas_query", BenchmarkStat::from_durations(&[0.1]).unwrap());
        assert!(!Outcome::Benchmarks(benches).reports_success());
    }

    #[test]
    fn benchmark_stats_from_durations() {
        let stat = BenchmarkStat::from_durations(&[0.2, 0.1, 0.3]).unwrap();
        match stat {
            BenchmarkStat::Measured {
                avg_duration,
                min_duration,
                max_duration,
                runs,
            } => {
                assert!((avg_duration - 0.2).abs() < 1e-9);
                assert_eq!(min_duration, 0.1);
                assert_eq!(max_duration, 0.3);
                assert_eq!(runs, 3);
            }
            other => panic!("expected statistics, got {:?}", other),
        }
        assert!(BenchmarkStat::from_durations(&[]).is_none());
    }

    #[test]
    fn untagged_variants_serialize_flat() {
        let failed = serde_json::to_value(Analysis::Failed {
            error: "file is not a database".to_string(),
        })
        .unwrap();
        assert_eq!(failed, serde_json::json!({"error": "file is not a database"}));

        let server = serde_json::to_value(ServerOutcome::started("startup test", 5.0)).unwrap();
        assert_eq!(server["success"], true);
        assert_eq!(server["note"], "startup test");
    }

    #[test]
    fn error_line_skips_blank_lines() {
        let mut result = probe(false);
        result.stderr = "\n  \nboom: no such table\ntrace".to_string();
        assert_eq!(result.error_line(), "boom: no such table");
        result.stderr.clear();
        assert_eq!(result.error_line(), "no error output");
    }
}
