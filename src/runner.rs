//! Script execution with identity switch, scoped environment and timeout
//!
//! One invocation:
//! 1. Overlay the configured environment onto the child only
//! 2. Rewrite parameters against the deployment root of the script
//! 3. Start the script as the owner, in its own process group
//! 4. Capture stdout and stderr through one shared pipe
//! 5. Kill the whole group if the deadline passes
//! 6. Classify the exit status

use declarative::{Identity, PrivilegeContext};
use manifest::FileManifest;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use std::fmt;
use std::io::{ErrorKind, PipeWriter, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::deployment::{DeploymentSpec, EXIT_NOT_FOUND};
use crate::error::{ReconcileError, Result};
use crate::rewrite::rewrite_params;

/// How often a running script is polled
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to keep reading output after the script exits
///
/// Background descendants may hold the pipe open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Interpreter for scripts without a `#!` line, as `execvp` would use
const FALLBACK_SHELL: &str = "/bin/sh";

/// Whether a run may change real state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Read-only check against sandboxed copies
    Audit,
    /// Authorized run against deployed files
    Apply,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audit => f.write_str("audit"),
            Self::Apply => f.write_str("apply"),
        }
    }
}

/// Meaning of an exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    ChangesRequired,
    Warning,
    NotFound,
    FatalError,
}

/// Classify an exit code for the given mode
///
/// Total over all integers: every code maps to exactly one class.
pub fn classify(code: i32, spec: &DeploymentSpec, mode: Mode) -> Classification {
    if code == EXIT_NOT_FOUND {
        Classification::NotFound
    } else if code == 0 {
        Classification::Success
    } else if spec.change_codes.contains(&code) {
        match mode {
            Mode::Audit => Classification::ChangesRequired,
            Mode::Apply => Classification::FatalError,
        }
    } else if spec.warning_codes.contains(&code) {
        Classification::Warning
    } else {
        Classification::FatalError
    }
}

/// Result of one script invocation that did not abort the cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub command: String,
    pub exit_status: i32,
    pub captured_output: String,
    pub classification: Classification,
}

impl ExecutionOutcome {
    pub fn changes_required(&self) -> bool {
        self.classification == Classification::ChangesRequired
    }
}

/// Environment applied to one child process
///
/// The ambient process environment is never modified, so nothing needs
/// restoring after the child exits, times out or fails to start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: Vec<(String, String)>,
}

impl EnvOverlay {
    /// Parse `KEY=VALUE` entries, splitting on the first `=`
    ///
    /// Entries without `=` are skipped; validation rejects them earlier.
    pub fn parse(entries: &[String]) -> Self {
        let vars = entries
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { vars }
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Add the overlay to `command`
    pub fn apply(&self, command: &mut Command) {
        command.envs(self.vars.iter().map(|(k, v)| (k, v)));
    }
}

/// Runs a deployment's script as its owner
pub struct ScriptRunner<'a> {
    spec: &'a DeploymentSpec,
    manifest: &'a FileManifest,
    owner: &'a Identity,
    privilege: &'a dyn PrivilegeContext,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(
        spec: &'a DeploymentSpec,
        manifest: &'a FileManifest,
        owner: &'a Identity,
        privilege: &'a dyn PrivilegeContext,
    ) -> Self {
        Self {
            spec,
            manifest,
            owner,
            privilege,
        }
    }

    /// Run the script at `script_path` with `params` in `mode`
    ///
    /// Returns an outcome for `Success` and audit-mode `ChangesRequired`;
    /// every other classification aborts with an error carrying the
    /// command line, exit code and captured output.
    pub fn run(&self, script_path: &Path, params: &[String], mode: Mode) -> Result<ExecutionOutcome> {
        let resource = self.spec.name.as_str();
        let overlay = EnvOverlay::parse(&self.spec.environment);
        let root = rewrite_root(script_path, &self.spec.script_name);
        let args = rewrite_params(params, self.manifest, &root);
        let command_line = command_line(script_path, &args);

        log::info!("Running `{}` as {} ({} mode)", command_line, self.owner.name, mode);
        log::debug!("{} environment override(s) for the child", overlay.vars().len());

        let (reader, writer) = std::io::pipe()
            .map_err(|e| ReconcileError::io(resource, "failed to create output pipe for", script_path, e))?;

        let mut spawned = self.spawn(script_path, None, &args, &root, &overlay, &writer)?;
        if matches!(&spawned, Err(e) if e.raw_os_error() == Some(Errno::ENOEXEC as i32)) {
            log::debug!(
                "{} has no interpreter line, running it with {}",
                script_path.display(),
                FALLBACK_SHELL
            );
            spawned = self.spawn(
                Path::new(FALLBACK_SHELL),
                Some(script_path),
                &args,
                &root,
                &overlay,
                &writer,
            )?;
        }
        // Our write end must close so EOF can arrive.
        drop(writer);

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ReconcileError::NotFound {
                    resource: resource.to_string(),
                    command: command_line,
                    output: e.to_string(),
                });
            }
            Err(e) => return Err(ReconcileError::io(resource, "failed to execute", script_path, e)),
        };

        let captured = Arc::new(Mutex::new(Vec::new()));
        let drain = spawn_drain(reader, Arc::clone(&captured));

        let status = match wait_with_deadline(&mut child, self.spec.timeout()) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_group(&mut child);
                let output = collect_output(drain, &captured);
                log::warn!(
                    "`{}` exceeded {}s and was killed",
                    command_line,
                    self.spec.timeout_seconds
                );
                return Err(ReconcileError::Timeout {
                    resource: resource.to_string(),
                    command: command_line,
                    seconds: self.spec.timeout_seconds,
                    output,
                });
            }
            Err(e) => {
                kill_group(&mut child);
                return Err(ReconcileError::io(resource, "failed to wait for", script_path, e));
            }
        };

        let output = collect_output(drain, &captured);
        let Some(code) = status.code() else {
            let signal = status.signal().unwrap_or_default();
            return Err(ReconcileError::CommandFailed {
                resource: resource.to_string(),
                command: command_line,
                status: format!("killed by signal {signal}"),
                output,
            });
        };

        let classification = classify(code, self.spec, mode);
        log::debug!("`{}` exited {} => {:?}", command_line, code, classification);

        self.outcome(command_line, code, output, classification, mode)
    }

    /// Start `program` as the owner, both output streams going to `writer`
    ///
    /// The outer error is a setup failure; the inner one is the spawn itself.
    fn spawn(
        &self,
        program: &Path,
        script: Option<&Path>,
        args: &[String],
        root: &Path,
        overlay: &EnvOverlay,
        writer: &PipeWriter,
    ) -> Result<std::io::Result<Child>> {
        let resource = self.spec.name.as_str();
        let pipe_error = |e: std::io::Error| {
            ReconcileError::io(resource, "failed to create output pipe for", program, e)
        };
        let stdout = writer.try_clone().map_err(pipe_error)?;
        let stderr = writer.try_clone().map_err(pipe_error)?;

        let mut command = Command::new(program);
        command
            .args(script)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);
        overlay.apply(&mut command);
        self.privilege
            .run_as(self.owner, &mut command)
            .map_err(|e| ReconcileError::Identity {
                resource: resource.to_string(),
                user: self.owner.name.clone(),
                message: format!("{e:#}"),
            })?;

        Ok(command.spawn())
    }

    fn outcome(
        &self,
        command: String,
        code: i32,
        output: String,
        classification: Classification,
        mode: Mode,
    ) -> Result<ExecutionOutcome> {
        let resource = self.spec.name.clone();
        match classification {
            Classification::Success | Classification::ChangesRequired => Ok(ExecutionOutcome {
                command,
                exit_status: code,
                captured_output: output,
                classification,
            }),
            Classification::NotFound => Err(ReconcileError::NotFound {
                resource,
                command,
                output,
            }),
            Classification::Warning => Err(ReconcileError::Warning {
                resource,
                command,
                code,
                output,
            }),
            Classification::FatalError
                if mode == Mode::Apply && self.spec.change_codes.contains(&code) =>
            {
                Err(ReconcileError::UnexpectedApply {
                    resource,
                    command,
                    code,
                    output,
                })
            }
            Classification::FatalError => Err(ReconcileError::CommandFailed {
                resource,
                command,
                status: format!("exit {code}"),
                output,
            }),
        }
    }
}

/// Root that managed-file parameters resolve against
///
/// Strips the script's own relative components from its path, so a
/// top-level script yields its directory and a nested one the deployment root.
pub fn rewrite_root(script_path: &Path, script_name: &str) -> PathBuf {
    let depth = Path::new(script_name).components().count();
    script_path
        .ancestors()
        .nth(depth)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn command_line(script_path: &Path, args: &[String]) -> String {
    std::iter::once(script_path.to_string_lossy().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn_drain(mut reader: std::io::PipeReader, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => match sink.lock() {
                    Ok(mut out) => out.extend_from_slice(&buf[..n]),
                    Err(poisoned) => poisoned.into_inner().extend_from_slice(&buf[..n]),
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    })
}

/// Poll until the child exits or `timeout` passes (`Ok(None)`)
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGKILL the child's process group and reap the child
fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        log::debug!("killpg({pgid}) failed: {e}, killing child only");
        let _ = child.kill();
    }
    let _ = child.wait();
}

fn collect_output(drain: JoinHandle<()>, captured: &Arc<Mutex<Vec<u8>>>) -> String {
    let deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
    while !drain.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if drain.is_finished() {
        let _ = drain.join();
    } else {
        log::debug!("Output pipe still open after exit, using what was read");
    }

    let bytes = match captured.lock() {
        Ok(out) => out.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    String::from_utf8_lossy(&bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::SystemPrivilege;
    use crate::test_support::{NoUsers, spec_for};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        spec: DeploymentSpec,
        manifest: FileManifest,
        owner: Identity,
    }

    impl Fixture {
        fn new(body: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let spec = spec_for(dir.path());
            let manifest = crate::test_support::manifest_with_script(body, &[("data.txt", "d")]);
            for entry in manifest.entries() {
                let path = dir.path().join(&entry.path);
                fs::write(&path, entry.rendered()).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            let owner = SystemPrivilege::current().unwrap();
            Self {
                dir,
                spec,
                manifest,
                owner,
            }
        }

        fn run(&self, params: &[&str], mode: Mode) -> Result<ExecutionOutcome> {
            let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
            ScriptRunner::new(&self.spec, &self.manifest, &self.owner, &SystemPrivilege).run(
                &self.dir.path().join("script.sh"),
                &params,
                mode,
            )
        }
    }

    #[test]
    fn test_classification_is_total() {
        let spec = spec_for(Path::new("/d"));
        for code in -300..=300 {
            for mode in [Mode::Audit, Mode::Apply] {
                let class = classify(code, &spec, mode);
                let expected = match code {
                    127 => Classification::NotFound,
                    0 => Classification::Success,
                    2 if mode == Mode::Audit => Classification::ChangesRequired,
                    3 => Classification::Warning,
                    _ => Classification::FatalError,
                };
                assert_eq!(class, expected, "code {code} in {mode}");
            }
        }
    }

    #[test]
    fn test_env_overlay_splits_on_first_equals() {
        let overlay = EnvOverlay::parse(&["A=1".into(), "URL=a=b".into(), "EMPTY=".into()]);
        assert_eq!(
            overlay.vars(),
            &[
                ("A".to_string(), "1".to_string()),
                ("URL".to_string(), "a=b".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_rewrite_root() {
        assert_eq!(
            rewrite_root(Path::new("/sb/run.sh"), "run.sh"),
            PathBuf::from("/sb")
        );
        assert_eq!(
            rewrite_root(Path::new("/sb/bin/run.sh"), "bin/run.sh"),
            PathBuf::from("/sb")
        );
    }

    #[test]
    fn test_success_captures_merged_output() {
        let fx = Fixture::new("echo out\necho err >&2\nexit 0");
        let outcome = fx.run(&["audit"], Mode::Audit).unwrap();
        assert_eq!(outcome.classification, Classification::Success);
        assert!(outcome.captured_output.contains("out"));
        assert!(outcome.captured_output.contains("err"));
        assert!(!outcome.changes_required());
    }

    #[test]
    fn test_change_code_in_audit_is_not_error() {
        let fx = Fixture::new("echo pending\nexit 2");
        let outcome = fx.run(&["audit"], Mode::Audit).unwrap();
        assert!(outcome.changes_required());
        assert_eq!(outcome.exit_status, 2);
    }

    #[test]
    fn test_change_code_in_apply_is_unexpected() {
        let fx = Fixture::new("echo again\nexit 2");
        let err = fx.run(&["apply"], Mode::Apply).unwrap_err();
        assert!(matches!(err, ReconcileError::UnexpectedApply { code: 2, .. }));
        assert!(err.to_string().contains("again"));
    }

    #[test]
    fn test_warning_code_is_fatal_in_audit() {
        let fx = Fixture::new("echo careful\nexit 3");
        let err = fx.run(&["audit"], Mode::Audit).unwrap_err();
        match err {
            ReconcileError::Warning { code, output, .. } => {
                assert_eq!(code, 3);
                assert!(output.contains("careful"));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_exit_127_is_not_found() {
        let fx = Fixture::new("exit 127");
        let err = fx.run(&["audit"], Mode::Audit).unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { .. }));
    }

    #[test]
    fn test_missing_script_is_not_found() {
        let fx = Fixture::new("exit 0");
        let params = vec!["audit".to_string()];
        let err = ScriptRunner::new(&fx.spec, &fx.manifest, &fx.owner, &SystemPrivilege)
            .run(&fx.dir.path().join("absent.sh"), &params, Mode::Audit)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { .. }));
    }

    #[test]
    fn test_other_code_is_command_failure() {
        let fx = Fixture::new("exit 9");
        let err = fx.run(&["audit"], Mode::Audit).unwrap_err();
        assert!(matches!(err, ReconcileError::CommandFailed { .. }));
        assert!(err.to_string().contains("exit 9"));
    }

    #[test]
    fn test_params_are_rewritten_against_script_dir() {
        let fx = Fixture::new("echo \"arg=$1\"");
        let outcome = fx.run(&["data.txt"], Mode::Audit).unwrap();
        let expected = fx.dir.path().join("data.txt");
        assert!(
            outcome
                .captured_output
                .contains(&format!("arg={}", expected.display()))
        );
        assert!(outcome.command.ends_with(&expected.display().to_string()));
    }

    #[test]
    fn test_environment_reaches_child_but_not_ambient() {
        let mut fx = Fixture::new("echo \"v=$SCRIPTDEPLOY_TEST_VAR\"");
        fx.spec.environment = vec!["SCRIPTDEPLOY_TEST_VAR=a=b".into()];
        let outcome = fx.run(&["audit"], Mode::Audit).unwrap();
        assert!(outcome.captured_output.contains("v=a=b"));
        assert!(std::env::var_os("SCRIPTDEPLOY_TEST_VAR").is_none());
    }

    #[test]
    fn test_timeout_kills_script() {
        let mut fx = Fixture::new("sleep 30");
        fx.spec.timeout_seconds = 1;
        let started = Instant::now();
        let err = fx.run(&["audit"], Mode::Audit).unwrap_err();
        assert!(matches!(err, ReconcileError::Timeout { seconds: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_script_without_interpreter_line_runs_with_sh() {
        let fx = Fixture::new("exit 0");
        let script = fx.dir.path().join("plain.sh");
        fs::write(&script, "echo \"hi $1\"\nexit 2\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut spec = fx.spec.clone();
        spec.script_name = "plain.sh".into();
        let params = vec!["data.txt".to_string()];
        let outcome = ScriptRunner::new(&spec, &fx.manifest, &fx.owner, &SystemPrivilege)
            .run(&script, &params, Mode::Audit)
            .unwrap();

        assert!(outcome.changes_required());
        let expected = fx.dir.path().join("data.txt");
        assert!(
            outcome
                .captured_output
                .contains(&format!("hi {}", expected.display()))
        );
    }

    #[test]
    fn test_timeout_keeps_partial_output() {
        let mut fx = Fixture::new("echo started\nsleep 30");
        fx.spec.timeout_seconds = 1;
        let err = fx.run(&["audit"], Mode::Audit).unwrap_err();
        match err {
            ReconcileError::Timeout { output, .. } => assert!(output.contains("started")),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_background_child_does_not_block() {
        let fx = Fixture::new("sleep 30 &\necho done");
        let started = Instant::now();
        let outcome = fx.run(&["audit"], Mode::Audit).unwrap();
        assert!(outcome.captured_output.contains("done"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_identity_switch_failure_is_fatal() {
        let fx = Fixture::new("exit 0");
        let params = vec!["audit".to_string()];
        let err = ScriptRunner::new(&fx.spec, &fx.manifest, &fx.owner, &NoUsers)
            .run(&fx.dir.path().join("script.sh"), &params, Mode::Audit)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Identity { .. }));
    }
}
