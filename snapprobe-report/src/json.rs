//! JSON Output

use crate::report::RunReport;

/// Generate a prettified JSON report.
///
/// The full result mapping is serialized with nothing omitted, including raw
/// stdout and stderr of every probe.
pub fn generate_json_report(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Analysis, NamedResults, Outcome, ProbeResult, SourceInfo};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn report_exposes_analysis_counts() {
        let mut results = NamedResults::new();
        results.insert(
            "database_analysis",
            Outcome::Analysis(Analysis::Inspected {
                tables: vec!["TMArea".to_string(), "TMTask".to_string()],
                counts: BTreeMap::from([("tasks".to_string(), 100)]),
            }),
        );
        results.insert(
            "health_check",
            Outcome::Probe(ProbeResult::failed("health", "spawn failed", 0.0)),
        );
        let report = RunReport::aggregate(
            PathBuf::from("/tmp/things3_test_x/test_things.sqlite"),
            SourceInfo {
                path: PathBuf::from("/data/main.sqlite"),
                from_backup: false,
            },
            Vec::new(),
            results,
        );

        let json = generate_json_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"]["database_analysis"]["counts"]["tasks"], 100);
        assert_eq!(value["results"]["health_check"]["success"], false);
        assert_eq!(
            value["database_path"],
            "/tmp/things3_test_x/test_things.sqlite"
        );
        assert!(value["timestamp"].is_string());
    }
}
