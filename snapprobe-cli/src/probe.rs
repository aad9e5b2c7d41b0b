//! Process Probe
//!
//! Launches the external binary with a bounded time budget and turns whatever
//! happens into a [`ProbeResult`]. Nothing here returns an error: a missing
//! binary, a crash, a timeout and an operator interrupt are all recorded as
//! `success: false` with a message in `stderr`.
//!
//! Each child runs in its own process group. On timeout or interrupt the whole
//! group gets SIGTERM, a short grace period, then SIGKILL. When the child exits
//! on its own, anything it left running in the group is killed before the
//! output is collected, so grandchildren holding the output pipes cannot
//! outlive the probe.
//!
//! The child's stdin is a pipe held open until the wait ends. Stdio servers
//! block on it and stay up for their whole window instead of exiting on EOF.

use crate::config::HarnessConfig;
use crate::interrupt;
use snapprobe_report::ProbeResult;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const GRACE_PERIOD: Duration = Duration::from_millis(500);

/// One unit of observation: run the binary with `args`, never fail.
pub trait Probe {
    /// Run a single invocation within `timeout`.
    fn run(&self, args: &[&str], timeout: Duration) -> ProbeResult;

    /// Whether callers should stop issuing further invocations.
    fn interrupted(&self) -> bool {
        false
    }
}

/// [`Probe`] backed by a real child process
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    binary: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl ProcessProbe {
    /// Probe `binary` with the inherited environment.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            envs: Vec::new(),
        }
    }

    /// Probe the configured binary against `snapshot`.
    ///
    /// The data-source variable is overridden to the snapshot path and the
    /// child's log level follows the harness's own verbosity.
    pub fn for_snapshot(config: &HarnessConfig, snapshot: &Path, verbose: bool) -> Self {
        let level = if verbose { "info" } else { "warn" };
        Self::new(&config.paths.binary)
            .env(&config.env.data_source_var, snapshot)
            .env(&config.env.log_level_var, level)
    }

    /// Add or override one environment variable for every invocation.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Binary under test
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Probe for ProcessProbe {
    fn run(&self, args: &[&str], timeout: Duration) -> ProbeResult {
        let mut command = Command::new(&self.binary);
        command.args(args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        run_command(command, args.join(" "), timeout)
    }

    fn interrupted(&self) -> bool {
        interrupt::requested()
    }
}

/// How the wait on a child ended
#[derive(Debug)]
enum Ending {
    Exited(ExitStatus),
    TimedOut,
    Interrupted,
    WaitFailed(std::io::Error),
}

/// Run a prepared command, capturing both streams and wall-clock time.
///
/// `display` becomes [`ProbeResult::command`].
pub fn run_command(mut command: Command, display: String, timeout: Duration) -> ProbeResult {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ProbeResult::failed(
                display,
                format!("Failed to launch {:?}: {}", command.get_program(), e),
                start.elapsed().as_secs_f64(),
            );
        }
    };

    let stdin = child.stdin.take();
    let stdout_reader = capture(child.stdout.take());
    let stderr_reader = capture(child.stderr.take());

    let ending = wait_with_deadline(&mut child, start, timeout);
    let elapsed = start.elapsed().as_secs_f64();
    drop(stdin);

    if matches!(ending, Ending::Exited(_)) {
        // Background stragglers would keep the pipes open past the budget.
        let _ = signal_group(child.id(), libc::SIGKILL);
    }

    let stdout = collect(stdout_reader);
    let stderr = collect(stderr_reader);

    match ending {
        Ending::Exited(status) => ProbeResult {
            success: status.success(),
            stdout,
            stderr,
            duration: elapsed,
            command: display,
            exit_code: status.code(),
            timed_out: false,
        },
        Ending::TimedOut => ProbeResult {
            success: false,
            stdout,
            stderr: with_message(
                stderr,
                &format!("Command timed out after {}s", timeout.as_secs_f64()),
            ),
            duration: timeout.as_secs_f64(),
            command: display,
            exit_code: None,
            timed_out: true,
        },
        Ending::Interrupted => ProbeResult {
            success: false,
            stdout,
            stderr: with_message(stderr, "Command interrupted by operator"),
            duration: elapsed,
            command: display,
            exit_code: None,
            timed_out: false,
        },
        Ending::WaitFailed(e) => ProbeResult {
            success: false,
            stdout,
            stderr: with_message(stderr, &format!("Failed waiting for command: {}", e)),
            duration: elapsed,
            command: display,
            exit_code: None,
            timed_out: false,
        },
    }
}

fn wait_with_deadline(child: &mut Child, start: Instant, timeout: Duration) -> Ending {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ending::Exited(status),
            Ok(None) => {}
            Err(e) => {
                terminate(child);
                return Ending::WaitFailed(e);
            }
        }

        if interrupt::requested() {
            terminate(child);
            return Ending::Interrupted;
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            terminate(child);
            return Ending::TimedOut;
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }
}

/// SIGTERM the child's group, give it [`GRACE_PERIOD`] to exit, then SIGKILL.
fn terminate(child: &mut Child) {
    let pid = child.id();
    // Ignore errors: the group may already be gone.
    let _ = signal_group(pid, libc::SIGTERM);

    let deadline = Instant::now() + GRACE_PERIOD;
    while Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // Stragglers in the group may still hold the pipes open.
    let _ = signal_group(pid, libc::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}

/// Send `signal` to every process in the group led by `pid`.
fn signal_group(pid: u32, signal: libc::c_int) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn with_message(captured: String, message: &str) -> String {
    if captured.trim().is_empty() {
        message.to_string()
    } else if captured.ends_with('\n') {
        format!("{}{}", captured, message)
    } else {
        format!("{}\n{}", captured, message)
    }
}
