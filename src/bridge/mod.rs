// src/bridge/mod.rs

//! Runs script bodies in an external interpreter through scratch files.
//!
//! Each call writes its own uniquely named scratch file, launches one
//! interpreter process under a timeout and an output cap, and deletes the file
//! afterwards whatever the outcome. Files that survive a crash or a failed
//! delete are evicted by the sweep at the start of later calls.

mod cancel;
mod capture;
mod interpreter;
mod job;
mod result;
mod scratch;

use std::{
    path::{Path, PathBuf},
    process::{Child, Stdio},
    thread,
    time::{Duration, Instant},
};

pub use cancel::CancelToken;
use capture::Termination;
pub use interpreter::Interpreter;
pub use job::{sanitize_label, ScriptJob};
pub use result::{ScriptResponse, ScriptResult};
pub use scratch::{ScratchDir, SweepReport};
use tracing::{debug, error, info, warn};

use crate::{config::BridgeConfig, errors::ScriptFailure};

/// Per-call overrides. Anything unset falls back to the bridge configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub timeout: Option<Duration>,
    pub max_output_bytes: Option<usize>,
    pub cancel: Option<CancelToken>,
}

impl ExecOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = Some(limit);
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A script started in its own console window.
#[derive(Debug, Clone)]
pub struct LaunchedScript {
    pub label: String,
    pub scratch_path: PathBuf,
    /// Process id of the launched interpreter, or of `cmd` on Windows.
    pub pid: u32,
}

/// Script execution bridge. Holds no per-job state, so one instance can be
/// shared (e.g. behind an `Arc`) by any number of concurrent callers.
#[derive(Debug)]
pub struct ScriptBridge {
    config: BridgeConfig,
    scratch: ScratchDir,
}

struct RunOutcome {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    failure: Option<ScriptFailure>,
}

impl RunOutcome {
    fn failed(failure: ScriptFailure) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            failure: Some(failure),
        }
    }
}

impl ScriptBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let scratch = ScratchDir::new(config.scratch_dir.clone());
        Self { config, scratch }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Deletes scratch files older than the configured staleness threshold.
    pub fn sweep(&self) -> SweepReport {
        let report = self.scratch.sweep(self.config.stale_after);
        if report.removed > 0 || report.failed > 0 {
            info!(
                "Scratch sweep removed {} stale file(s), {} could not be deleted",
                report.removed, report.failed
            );
        }
        report
    }

    /// Runs `body` with the default timeout and output cap.
    pub fn execute(&self, name: &str, body: &str) -> ScriptResult {
        self.execute_with(name, body, &ExecOptions::default())
    }

    /// Runs `body` in the configured interpreter.
    ///
    /// Never fails: launch errors, non-zero exits, timeouts, overflows and
    /// cancellation are all reported through [`ScriptResult::failure`]. The
    /// scratch file is deleted before returning; if that fails it is flagged
    /// with [`ScriptResult::scratch_retained`] and left for the sweep.
    pub fn execute_with(&self, name: &str, body: &str, options: &ExecOptions) -> ScriptResult {
        let started = Instant::now();
        let job = ScriptJob::new(name, body);
        self.sweep();

        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let limit = options
            .max_output_bytes
            .unwrap_or(self.config.max_output_bytes);

        debug!(
            "{} -> Executing script ({} bytes, timeout {}ms, output cap {} bytes)",
            job.label,
            job.body.len(),
            timeout.as_millis(),
            limit
        );

        let (outcome, scratch_path, scratch_retained) =
            match self.scratch.write(&job, &self.config.interpreter.extension) {
                Ok(scratch) => {
                    let path = scratch.path().to_path_buf();
                    let outcome = self.run(&job, &path, timeout, limit, options.cancel.as_ref());
                    let retained = match scratch.remove() {
                        Ok(()) => false,
                        Err(e) => {
                            warn!(
                                "{} -> Failed to delete scratch file {}: {}. Leaving it for the sweep.",
                                job.label,
                                path.display(),
                                e
                            );
                            true
                        }
                    };
                    (outcome, path, retained)
                }
                Err(e) => {
                    let path = self
                        .scratch
                        .path()
                        .join(job.file_name(&self.config.interpreter.extension));
                    error!("{} -> Failed to write scratch file: {}", job.label, e);
                    let outcome = RunOutcome::failed(ScriptFailure::ScratchWrite {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                    (outcome, path, false)
                }
            };

        let result = ScriptResult {
            label: job.label,
            scratch_path,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            exit_code: outcome.exit_code,
            failure: outcome.failure,
            scratch_retained,
            started_at: job.created_at,
            elapsed: started.elapsed(),
        };

        match &result.failure {
            None => debug!(
                "{} -> Script succeeded in {}ms. Output: {}",
                result.label,
                result.elapsed.as_millis(),
                preview(&result.stdout)
            ),
            Some(failure) => error!(
                "{} -> Script failed after {}ms: {}",
                result.label,
                result.elapsed.as_millis(),
                failure
            ),
        }

        result
    }

    /// Starts `body` in a console window of its own and returns without
    /// waiting for it.
    ///
    /// Nothing is captured and no timeout applies. With `keep_open` the
    /// window stays up after the script ends, where the interpreter supports
    /// it. The scratch file is deleted once the launched process exits; on
    /// Windows `start` exits before the interpreter reads the file, so there
    /// it is left for the sweep.
    pub fn launch_detached(
        &self,
        name: &str,
        body: &str,
        keep_open: bool,
    ) -> Result<LaunchedScript, ScriptFailure> {
        let job = ScriptJob::new(name, body);
        self.sweep();

        let interpreter = &self.config.interpreter;
        let scratch = self
            .scratch
            .write(&job, &interpreter.extension)
            .map_err(|e| {
                let path = self.scratch.path().join(job.file_name(&interpreter.extension));
                error!("{} -> Failed to write scratch file: {}", job.label, e);
                ScriptFailure::ScratchWrite {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

        let mut child = interpreter
            .window_command(scratch.path(), keep_open)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("{} -> Failed to open script window: {}", job.label, e);
                ScriptFailure::Launch {
                    program: interpreter.program.clone(),
                    reason: e.to_string(),
                }
            })?;

        let launched = LaunchedScript {
            label: job.label,
            scratch_path: scratch.path().to_path_buf(),
            pid: child.id(),
        };
        info!("{} -> Opened script window (pid {})", launched.label, launched.pid);

        let label = launched.label.clone();
        thread::spawn(move || {
            match child.wait() {
                Ok(status) => debug!("{} -> Script window closed ({})", label, status),
                Err(e) => warn!("{} -> Lost track of script window: {}", label, e),
            }
            if cfg!(windows) {
                scratch.leave_for_sweep();
            } else if let Err(e) = scratch.remove() {
                warn!(
                    "{} -> Failed to delete scratch file: {}. Leaving it for the sweep.",
                    label, e
                );
            }
        });

        Ok(launched)
    }

    fn run(
        &self,
        job: &ScriptJob,
        path: &Path,
        timeout: Duration,
        limit: usize,
        cancel: Option<&CancelToken>,
    ) -> RunOutcome {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return RunOutcome::failed(ScriptFailure::Cancelled);
        }

        let interpreter = &self.config.interpreter;
        let mut child = match interpreter
            .command(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return RunOutcome::failed(ScriptFailure::Launch {
                    program: interpreter.program.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let (termination, output) = capture::supervise(&mut child, timeout, limit, cancel);
        if termination.needs_kill() {
            terminate(&job.label, &mut child);
        }

        let (exit_code, failure) = match termination {
            Termination::Exited(status) if status.success() => (status.code(), None),
            Termination::Exited(status) => (
                status.code(),
                Some(ScriptFailure::NonZeroExit {
                    code: status.code(),
                }),
            ),
            Termination::TimedOut => (None, Some(ScriptFailure::Timeout { after: timeout })),
            Termination::Overflowed => (None, Some(ScriptFailure::OutputOverflow { limit })),
            Termination::Cancelled => (None, Some(ScriptFailure::Cancelled)),
            Termination::WaitFailed(e) => (
                None,
                Some(ScriptFailure::Launch {
                    program: interpreter.program.clone(),
                    reason: format!("lost track of process: {}", e),
                }),
            ),
        };

        RunOutcome {
            stdout: decode(&output.stdout),
            stderr: decode(&output.stderr),
            exit_code,
            failure,
        }
    }
}

/// Kills and reaps a child that is still running.
fn terminate(label: &str, child: &mut Child) {
    if let Err(e) = child.kill() {
        // Already exited between the decision and the kill.
        debug!("{} -> Kill failed: {}", label, e);
    }
    if let Err(e) = child.wait() {
        warn!("{} -> Failed to reap interpreter process: {}", label, e);
    }
}

/// Decodes captured output without growing it past the captured length. A
/// character cut in half by the output cap is dropped, and replacement
/// characters for invalid bytes never push the text over the cap.
fn decode(bytes: &[u8]) -> String {
    let valid = match std::str::from_utf8(bytes) {
        Ok(text) => return text.trim().to_string(),
        Err(e) if e.error_len().is_none() => &bytes[..e.valid_up_to()],
        Err(_) => bytes,
    };

    let mut text = String::from_utf8_lossy(valid).into_owned();
    let mut end = text.len().min(bytes.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.trim().to_string()
}

fn preview(output: &str) -> String {
    output.chars().take(200).collect()
}

/// Convenience for building a bridge rooted at `dir` with a given
/// interpreter, mostly useful in tests and tools.
pub fn bridge_at(dir: impl Into<PathBuf>, interpreter: Interpreter) -> ScriptBridge {
    ScriptBridge::new(BridgeConfig::with_scratch_dir(dir).interpreter(interpreter))
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, sync::Arc};

    use tempfile::TempDir;

    use super::*;

    fn sh_bridge() -> (TempDir, ScriptBridge) {
        let tmp = TempDir::new().unwrap();
        let bridge = bridge_at(tmp.path().join("scripts"), Interpreter::posix_shell());
        (tmp, bridge)
    }

    fn scratch_is_empty(bridge: &ScriptBridge) -> bool {
        match fs::read_dir(bridge.scratch_dir()) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    #[test]
    fn test_check_flag_scenario() {
        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute("check-flag", "echo 'true'");
        assert_eq!(
            result.to_response(),
            ScriptResponse {
                success: true,
                output: "true".to_string(),
                error: String::new(),
            }
        );
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.scratch_path.exists());
        assert!(!result.scratch_retained);
    }

    #[test]
    fn test_bad_command_scenario() {
        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute("bad-cmd", "NotARealCommand-XYZ");
        let response = result.to_response();
        assert!(!response.success);
        assert_eq!(response.output, "");
        assert!(response.error.contains("exited with status"));
        assert!(matches!(result.failure, Some(ScriptFailure::NonZeroExit { code: Some(c) }) if c != 0));
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_exit_code_mapping_keeps_stdout() {
        let (_tmp, bridge) = sh_bridge();

        let ok = bridge.execute("hello", "echo hello\nexit 0");
        assert!(ok.succeeded());
        assert_eq!(ok.stdout, "hello");
        assert_eq!(ok.error_text(), "");

        let failed = bridge.execute("hello", "echo hello\nexit 1");
        assert!(!failed.succeeded());
        assert_eq!(failed.stdout, "hello");
        assert_eq!(failed.exit_code, Some(1));
    }

    #[test]
    fn test_stderr_is_captured_separately() {
        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute("warn", "echo out\necho err 1>&2");
        assert!(result.succeeded());
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
        assert_eq!(result.to_response().error, "err");
    }

    #[test]
    fn test_timeout_kills_runaway_script() {
        let (_tmp, bridge) = sh_bridge();
        let started = Instant::now();
        let result = bridge.execute_with(
            "forever",
            "echo started\nwhile true; do sleep 0.05; done",
            &ExecOptions::default().timeout_ms(200),
        );
        let elapsed = started.elapsed();

        assert!(matches!(result.failure, Some(ScriptFailure::Timeout { .. })));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
        assert_eq!(result.stdout, "started");
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_output_flood_is_capped() {
        let (_tmp, bridge) = sh_bridge();
        let limit = 64 * 1024;
        let result = bridge.execute_with(
            "flood",
            "while true; do echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; done",
            &ExecOptions::default().max_output_bytes(limit).timeout_ms(10_000),
        );

        assert!(matches!(
            result.failure,
            Some(ScriptFailure::OutputOverflow { limit: l }) if l == limit
        ));
        assert!(result.stdout.len() + result.stderr.len() <= limit);
        assert!(!result.stdout.is_empty());
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_output_cap_counts_both_streams() {
        let (_tmp, bridge) = sh_bridge();
        let limit = 64 * 1024;
        let result = bridge.execute_with(
            "split-flood",
            "while true; do echo aaaaaaaaaaaaaaaa; echo bbbbbbbbbbbbbbbb 1>&2; done",
            &ExecOptions::default().max_output_bytes(limit).timeout_ms(10_000),
        );

        assert!(matches!(
            result.failure,
            Some(ScriptFailure::OutputOverflow { limit: l }) if l == limit
        ));
        assert!(
            result.stdout.len() + result.stderr.len() <= limit,
            "stdout {} + stderr {} bytes",
            result.stdout.len(),
            result.stderr.len()
        );
        assert!(!result.stdout.is_empty());
        assert!(!result.stderr.is_empty());
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_cap_splitting_a_character_stays_within_limit() {
        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute_with(
            "accents",
            "while true; do printf 'é'; done",
            &ExecOptions::default().max_output_bytes(7).timeout_ms(10_000),
        );

        assert!(matches!(result.failure, Some(ScriptFailure::OutputOverflow { limit: 7 })));
        assert!(result.stdout.len() <= 7, "{:?}", result.stdout);
        assert!(!result.stdout.is_empty());
        assert!(result.stdout.chars().all(|c| c == 'é'), "{:?}", result.stdout);
    }

    #[test]
    fn test_decode_never_grows_past_captured_bytes() {
        assert_eq!(decode(b"  plain text\n"), "plain text");
        // Second character cut after its first byte.
        assert_eq!(decode(&[0xC3, 0xA9, 0xC3]), "é");

        let invalid = decode(b"ok\xff\xff");
        assert!(invalid.len() <= 4);
        assert!(invalid.starts_with("ok"));

        assert_eq!(decode(b""), "");
    }

    #[test]
    fn test_undeletable_scratch_is_retained_without_failing() {
        let (_tmp, bridge) = sh_bridge();
        // Swap the scratch file for a directory so the delete fails.
        let result = bridge.execute("swap", "rm \"$0\"\nmkdir \"$0\"\necho ok");

        assert!(result.succeeded());
        assert_eq!(result.stdout, "ok");
        assert!(result.scratch_retained);
        assert!(result.scratch_path.is_dir());
        fs::remove_dir(&result.scratch_path).unwrap();
    }

    #[test]
    fn test_read_only_scratch_dir_defers_delete_to_sweep() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute("locked", "chmod a-w \"$(dirname \"$0\")\"\necho ok");
        let dir = bridge.scratch_dir().to_path_buf();

        // Root ignores directory permissions, so the delete goes through.
        let privileged = !result.scratch_retained;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
        if privileged {
            assert!(!result.scratch_path.exists());
            return;
        }

        assert!(result.succeeded());
        assert_eq!(result.stdout, "ok");
        assert!(result.scratch_path.exists());

        fs::File::options()
            .write(true)
            .open(&result.scratch_path)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(600))
            .unwrap();
        let report = bridge.sweep();
        assert_eq!(report.removed, 1);
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_result_records_creation_time() {
        let (_tmp, bridge) = sh_bridge();
        let before = chrono::Utc::now();
        let result = bridge.execute("timed", "echo ok");
        assert!(result.started_at >= before);
        assert!(result.started_at <= chrono::Utc::now());
    }

    #[test]
    fn test_launch_detached_runs_and_cleans_up() {
        let (tmp, bridge) = sh_bridge();
        let marker = tmp.path().join("launched.txt");
        let body = format!("echo launched > '{}'", marker.display());

        let launched = bridge.launch_detached("window", &body, true).unwrap();
        assert_eq!(launched.label, "window");
        assert!(launched.pid > 0);

        let deadline = Instant::now() + Duration::from_secs(10);
        while (launched.scratch_path.exists() || !marker.exists()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "launched");
        assert!(!launched.scratch_path.exists());
    }

    #[test]
    fn test_launch_detached_reports_missing_interpreter() {
        let tmp = TempDir::new().unwrap();
        let interpreter = Interpreter {
            program: "/nonexistent/interpreter".to_string(),
            args: Vec::new(),
            extension: "sh".to_string(),
            keep_open_arg: None,
        };
        let bridge = bridge_at(tmp.path(), interpreter);

        let err = bridge.launch_detached("window", "echo hi", false).unwrap_err();
        assert!(matches!(err, ScriptFailure::Launch { .. }));
        assert!(scratch_is_empty(&bridge));
    }

    #[test]
    fn test_background_child_holding_pipes_times_out() {
        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute_with(
            "background",
            "sleep 3 &\necho done\nexit 0",
            &ExecOptions::default().timeout_ms(500),
        );

        assert!(matches!(result.failure, Some(ScriptFailure::Timeout { .. })));
        assert_eq!(result.stdout, "done");
        assert!(result.elapsed < Duration::from_secs(3), "took {:?}", result.elapsed);
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_launch_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let interpreter = Interpreter {
            program: "/nonexistent/interpreter".to_string(),
            args: Vec::new(),
            extension: "sh".to_string(),
            keep_open_arg: None,
        };
        let bridge = bridge_at(tmp.path(), interpreter);

        let result = bridge.execute("missing", "echo hi");
        assert!(matches!(result.failure, Some(ScriptFailure::Launch { .. })));
        assert!(result.error_text().contains("/nonexistent/interpreter"));
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_cancel_kills_script_and_cleans_up() {
        let (_tmp, bridge) = sh_bridge();
        let token = CancelToken::new();
        let canceller = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });

        let result = bridge.execute_with(
            "cancel-me",
            "sleep 0.05; while true; do sleep 0.05; done",
            &ExecOptions::default().timeout_ms(10_000).cancel(token),
        );
        handle.join().unwrap();

        assert_eq!(result.failure, Some(ScriptFailure::Cancelled));
        assert!(result.elapsed < Duration::from_secs(5));
        assert!(!result.scratch_path.exists());
    }

    #[test]
    fn test_pre_cancelled_token_skips_launch() {
        let (_tmp, bridge) = sh_bridge();
        let token = CancelToken::new();
        token.cancel();

        let result = bridge.execute_with(
            "never-runs",
            "echo should-not-run",
            &ExecOptions::default().cancel(token),
        );
        assert_eq!(result.failure, Some(ScriptFailure::Cancelled));
        assert!(result.stdout.is_empty());
        assert!(scratch_is_empty(&bridge));
    }

    #[test]
    fn test_concurrent_jobs_with_same_name_stay_apart() {
        let (_tmp, bridge) = sh_bridge();
        let bridge = Arc::new(bridge);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    let body = format!("sleep 0.1\necho job-{}", i);
                    (i, bridge.execute("same-name", &body))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut paths: Vec<_> = results.iter().map(|(_, r)| r.scratch_path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);

        for (i, result) in &results {
            assert!(result.succeeded());
            assert_eq!(result.stdout, format!("job-{}", i));
            assert!(!result.scratch_path.exists());
        }
        assert!(scratch_is_empty(&bridge));
    }

    #[test]
    fn test_execute_sweeps_stale_orphans_first() {
        let (_tmp, bridge) = sh_bridge();
        fs::create_dir_all(bridge.scratch_dir()).unwrap();
        let orphan = bridge.scratch_dir().join("orphan-crashed.sh");
        fs::write(&orphan, "echo old").unwrap();
        fs::File::options()
            .write(true)
            .open(&orphan)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        let result = bridge.execute("after-crash", "echo fine");
        assert!(result.succeeded());
        assert!(!orphan.exists());
    }

    #[test]
    fn test_label_is_sanitized_into_file_name() {
        let (_tmp, bridge) = sh_bridge();
        let result = bridge.execute("../escape me", "echo ok");
        assert_eq!(result.label, "escapeme");
        assert_eq!(result.scratch_path.parent(), Some(bridge.scratch_dir()));
    }
}
