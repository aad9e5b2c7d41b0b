//! Probe Suite
//!
//! The fixed catalog of probes exercised on every run: a liveness check, the
//! read-only listing queries, and a server-mode smoke test.
//!
//! The smoke test is a liveness heuristic only. It passes when the server
//! prints its startup phrase on stderr, or when it merely stays alive for most
//! of its window. A hung server that never answers a request passes too; no
//! protocol message is ever exchanged.

use crate::config::ServerConfig;
use crate::probe::Probe;
use snapprobe_report::{NamedResults, ProbeResult, ServerOutcome};
use std::time::Duration;
use tracing::{debug, error, info};

/// Arguments of the liveness probe
pub const HEALTH_ARGS: &[&str] = &["health"];

/// Read-only listing queries, in execution order
pub const BASIC_OPERATIONS: &[(&[&str], &str)] = &[
    (&["inbox"], "inbox tasks"),
    (&["inbox", "--limit", "5"], "limited inbox tasks"),
    (&["today"], "today's tasks"),
    (&["projects"], "projects"),
    (&["areas"], "areas"),
];

/// stdout of a successful probe, classified
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    /// Valid JSON
    Structured(serde_json::Value),
    /// Anything else, kept verbatim
    Raw(String),
}

impl ParsedOutput {
    /// Classify `stdout`; a parse failure is the [`Raw`](Self::Raw) branch, not an error.
    pub fn parse(stdout: &str) -> Self {
        match serde_json::from_str(stdout) {
            Ok(value) => ParsedOutput::Structured(value),
            Err(_) => ParsedOutput::Raw(stdout.to_string()),
        }
    }

    /// Array length for JSON arrays, 1 for any other JSON value, `None` for
    /// free-form text.
    pub fn item_count(&self) -> Option<usize> {
        match self {
            ParsedOutput::Structured(serde_json::Value::Array(items)) => Some(items.len()),
            ParsedOutput::Structured(_) => Some(1),
            ParsedOutput::Raw(_) => None,
        }
    }
}

/// Run the liveness probe.
pub fn run_health(probe: &dyn Probe, timeout: Duration) -> ProbeResult {
    info!("Testing health check...");
    let result = probe.run(HEALTH_ARGS, timeout);
    if result.success {
        info!("✓ Health check passed");
    } else {
        error!("✗ Health check failed: {}", result.error_line());
    }
    result
}

/// Run [`BASIC_OPERATIONS`] in order.
pub fn run_suite(probe: &dyn Probe, timeout: Duration) -> NamedResults<ProbeResult> {
    info!("Testing basic operations...");
    run_catalog(probe, BASIC_OPERATIONS, timeout)
}

/// Run every `(args, name)` entry in order, one after another.
///
/// A failing entry never stops later ones; only an operator interrupt does.
pub fn run_catalog(
    probe: &dyn Probe,
    catalog: &[(&[&str], &str)],
    timeout: Duration,
) -> NamedResults<ProbeResult> {
    let mut results = NamedResults::new();
    for (args, name) in catalog {
        if probe.interrupted() {
            break;
        }
        debug!("Testing {}...", name);
        let result = probe.run(args, timeout);

        if result.success {
            match ParsedOutput::parse(&result.stdout).item_count() {
                Some(count) => info!("✓ {}: {} items", name, count),
                None => info!("✓ {}: non-JSON output", name),
            }
        } else {
            error!("✗ {} failed: {}", name, result.error_line());
        }
        results.insert(*name, result);
    }
    results
}

/// Whether a server-mode run counts as started.
///
/// True when stderr contains `startup_phrase` (case-insensitive) or the
/// process lasted at least `survival_ratio` of `window`.
pub fn server_started(
    result: &ProbeResult,
    startup_phrase: &str,
    survival_ratio: f64,
    window: Duration,
) -> bool {
    let announced = !startup_phrase.is_empty()
        && result
            .stderr
            .to_lowercase()
            .contains(&startup_phrase.to_lowercase());
    let survived = result.duration >= window.as_secs_f64() * survival_ratio;
    announced || survived
}

/// Start the server subcommand for `window` and classify the outcome.
pub fn run_server_smoke(probe: &dyn Probe, server: &ServerConfig, window: Duration) -> ServerOutcome {
    info!("Testing {} server...", server.subcommand);
    let result = probe.run(&[server.subcommand.as_str()], window);

    if server_started(&result, &server.startup_phrase, server.survival_ratio, window) {
        info!("✓ {} server appears to start correctly", server.subcommand);
        ServerOutcome::started(
            format!(
                "{} server startup test (liveness only, protocol not verified)",
                server.subcommand
            ),
            result.duration,
        )
    } else {
        error!(
            "✗ {} server test failed: {}",
            server.subcommand,
            result.error_line()
        );
        ServerOutcome::Failed(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Replays canned results keyed by the joined argument vector.
    struct ScriptedProbe {
        calls: RefCell<Vec<String>>,
        respond: fn(&str) -> ProbeResult,
    }

    impl ScriptedProbe {
        fn new(respond: fn(&str) -> ProbeResult) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                respond,
            }
        }
    }

    impl Probe for ScriptedProbe {
        fn run(&self, args: &[&str], _timeout: Duration) -> ProbeResult {
            let command = args.join(" ");
            self.calls.borrow_mut().push(command.clone());
            (self.respond)(&command)
        }
    }

    fn ok(command: &str, stdout: &str, duration: f64) -> ProbeResult {
        ProbeResult {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration,
            command: command.to_string(),
            exit_code: Some(0),
            timed_out: false,
        }
    }

    #[test]
    fn parsed_output_distinguishes_json_from_text() {
        let areas = ParsedOutput::parse(r#"[{"title":"Home"},{"title":"Work"}]"#);
        assert!(matches!(areas, ParsedOutput::Structured(_)));
        assert_eq!(areas.item_count(), Some(2));

        let object = ParsedOutput::parse(r#"{"status":"ok"}"#);
        assert_eq!(object.item_count(), Some(1));

        let text = ParsedOutput::parse("Inbox (3)\n- Buy milk\n");
        assert_eq!(text, ParsedOutput::Raw("Inbox (3)\n- Buy milk\n".to_string()));
        assert_eq!(text.item_count(), None);
    }

    #[test]
    fn suite_runs_catalog_in_order_despite_failures() {
        let probe = ScriptedProbe::new(|command| match command {
            "today" => ProbeResult::failed("today", "unknown subcommand: today", 0.01),
            other => ok(other, "[]", 0.01),
        });

        let results = run_suite(&probe, Duration::from_secs(1));
        let names: Vec<_> = results.names().collect();
        assert_eq!(
            names,
            ["inbox tasks", "limited inbox tasks", "today's tasks", "projects", "areas"]
        );
        assert!(!results.get("today's tasks").unwrap().success);
        assert!(results.get("areas").unwrap().success);
        assert_eq!(
            *probe.calls.borrow(),
            ["inbox", "inbox --limit 5", "today", "projects", "areas"]
        );
    }

    #[test]
    fn health_uses_the_health_subcommand() {
        let probe = ScriptedProbe::new(|command| ok(command, "ok", 0.002));
        let result = run_health(&probe, Duration::from_secs(1));
        assert!(result.success);
        assert_eq!(result.command, "health");
    }

    #[test]
    fn server_passes_on_startup_phrase() {
        let mut result = ProbeResult::failed("mcp", "INFO: MCP Server Started on stdio", 0.3);
        result.exit_code = Some(0);
        assert!(server_started(&result, "server started", 0.8, Duration::from_secs(5)));
    }

    #[test]
    fn server_passes_on_survival_alone() {
        let mut result = ProbeResult::failed("mcp", "Command timed out after 5s", 5.0);
        result.timed_out = true;
        assert!(server_started(&result, "server started", 0.8, Duration::from_secs(5)));

        let borderline = ProbeResult::failed("mcp", "", 4.0);
        assert!(server_started(&borderline, "server started", 0.8, Duration::from_secs(5)));
    }

    #[test]
    fn server_fails_when_it_dies_early() {
        let result = ProbeResult::failed("mcp", "error: database is locked", 0.2);
        assert!(!server_started(&result, "server started", 0.8, Duration::from_secs(5)));
    }

    #[test]
    fn smoke_test_wraps_outcomes() {
        let config = ServerConfig::default();

        let up = ScriptedProbe::new(|command| {
            ProbeResult::failed(command, "server started\nCommand timed out after 5s", 5.0)
        });
        let outcome = run_server_smoke(&up, &config, Duration::from_secs(5));
        assert!(outcome.is_success());
        assert_eq!(*up.calls.borrow(), ["mcp"]);

        let down = ScriptedProbe::new(|command| ProbeResult::failed(command, "panic", 0.1));
        match run_server_smoke(&down, &config, Duration::from_secs(5)) {
            ServerOutcome::Failed(result) => assert_eq!(result.stderr, "panic"),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
