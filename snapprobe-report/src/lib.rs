#![warn(missing_docs)]
//! SnapProbe Report - Result Model and Rendering
//!
//! Holds the structured outcome of a run and renders it as:
//! - JSON (machine-readable, complete)
//! - Human (terminal summary)

mod human;
mod json;
mod report;

pub use human::format_human_output;
pub use json::generate_json_report;
pub use report::{
    Analysis, BenchmarkStat, NamedResults, Outcome, ProbeResult, RunReport, RunResults,
    ServerOutcome, SourceInfo,
};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Full structured serialization
    Json,
    /// Human-readable terminal output
    Human,
}

impl OutputFormat {
    /// Pick the format from the `--json-output` flag.
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Render a report in the requested format.
pub fn render(report: &RunReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => generate_json_report(report),
        OutputFormat::Human => Ok(format_human_output(report)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn empty_report() -> RunReport {
        RunReport::aggregate(
            PathBuf::from("/tmp/things3_test_x/test_things.sqlite"),
            SourceInfo {
                path: PathBuf::from("/data/main.sqlite"),
                from_backup: true,
            },
            vec!["Using backup".to_string()],
            RunResults::new(),
        )
    }

    #[test]
    fn json_flag_selects_the_renderer() {
        let report = empty_report();

        let json = render(&report, OutputFormat::from_json_flag(true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["source"]["from_backup"], true);
        assert_eq!(value["warnings"][0], "Using backup");

        let human = render(&report, OutputFormat::from_json_flag(false)).unwrap();
        assert!(human.contains("SnapProbe Test Report"));
        assert!(serde_json::from_str::<serde_json::Value>(&human).is_err());
    }
}
