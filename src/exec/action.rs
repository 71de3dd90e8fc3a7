// src/exec/action.rs

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ActionConfig;
use crate::exec::context::RunContext;

/// Global default timeout when neither the action nor the heuristic says
/// otherwise.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound on captured output lines per stream; everything past this is
/// dropped with a marker so a chatty command cannot balloon memory.
const MAX_CAPTURED_LINES: usize = 2000;

/// How long to wait for the output readers to drain after the child exits
/// or is killed.
const READER_GRACE: Duration = Duration::from_secs(2);

/// An action definition resolved against its config: concrete command,
/// working directory, and effective timeout.
#[derive(Debug, Clone)]
pub struct PreparedAction {
    pub name: String,
    pub description: Option<String>,
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl PreparedAction {
    pub fn from_config(name: &str, cfg: &ActionConfig) -> Self {
        Self {
            name: name.to_string(),
            description: cfg.description.clone(),
            command: cfg.command.clone(),
            working_dir: cfg.working_dir.clone(),
            timeout: resolve_timeout(cfg.timeout_secs, &cfg.command),
        }
    }
}

/// Classified result of one action subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    /// Non-zero exit code (or termination by signal, reported as -1).
    Failed(i32),
    /// Resolved timeout elapsed; the process group was forcibly terminated.
    TimedOut,
    /// The command (or shell) could not be found: spawn `NotFound`, or the
    /// shell's own 127 exit.
    CommandNotFound,
    /// Spawn `PermissionDenied`, or the shell's 126 exit.
    PermissionDenied,
    /// The configured working directory does not exist.
    MissingWorkdir,
}

impl ActionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ActionStatus::Success)
    }
}

/// Everything recorded about one action attempt. Owned by the dispatch
/// coordinator for the duration of a run's dispatch, discarded after
/// logging.
#[derive(Debug)]
pub struct ActionOutcome {
    pub name: String,
    pub status: ActionStatus,
    pub duration: Duration,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Effective timeout for a command: explicit config beats the heuristic,
/// the heuristic beats the global default.
///
/// The heuristic keys off what the command appears to do: network calls are
/// expected to finish fast, container operations are not.
pub fn resolve_timeout(explicit_secs: Option<u64>, command: &str) -> Duration {
    if let Some(secs) = explicit_secs {
        return Duration::from_secs(secs);
    }

    let lower = command.to_lowercase();
    let heuristic = [
        (&["curl", "wget", "http"][..], 60),
        (&["kubectl"][..], 120),
        (&["git"][..], 180),
        (&["docker", "podman"][..], 300),
    ];
    for (keywords, secs) in heuristic {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Duration::from_secs(secs);
        }
    }

    DEFAULT_TIMEOUT
}

/// Run one action to completion (or timeout) and classify the result.
///
/// Never returns an error: every failure mode is folded into the outcome so
/// the coordinator can continue with the rest of the action list.
pub async fn execute(action: &PreparedAction, ctx: &RunContext) -> ActionOutcome {
    let started = Instant::now();

    if let Some(dir) = &action.working_dir
        && !dir.is_dir()
    {
        error!(
            action = %action.name,
            working_dir = ?dir,
            "working directory does not exist; action not started"
        );
        return ActionOutcome {
            name: action.name.clone(),
            status: ActionStatus::MissingWorkdir,
            duration: started.elapsed(),
            stdout: Vec::new(),
            stderr: vec![format!("working directory does not exist: {}", dir.display())],
        };
    }

    info!(
        action = %action.name,
        cmd = %action.command,
        description = action.description.as_deref().unwrap_or(""),
        timeout_secs = action.timeout.as_secs(),
        "starting action process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&action.command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&action.command);
        c
    };

    cmd.envs(ctx.env_vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &action.working_dir {
        cmd.current_dir(dir);
    }

    // Own process group so a timeout can take the whole tree down, not just
    // the shell.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            let status = classify_spawn_error(&err);
            log_spawn_failure(action, &err, status);
            return ActionOutcome {
                name: action.name.clone(),
                status,
                duration: started.elapsed(),
                stdout: Vec::new(),
                stderr: vec![format!("failed to spawn: {err}")],
            };
        }
    };

    let stdout_task = capture_lines(child.stdout.take(), action.name.clone(), "stdout");
    let stderr_task = capture_lines(child.stderr.take(), action.name.clone(), "stderr");

    let (status, duration) = tokio::select! {
        status_res = child.wait() => {
            let duration = started.elapsed();
            match status_res {
                Ok(exit) => (classify_exit(&exit), duration),
                Err(err) => {
                    error!(action = %action.name, error = %err, "waiting for action process failed");
                    (ActionStatus::Failed(-1), duration)
                }
            }
        }
        _ = tokio::time::sleep(action.timeout) => {
            let duration = started.elapsed();
            warn!(
                action = %action.name,
                timeout_secs = action.timeout.as_secs(),
                "action timed out; terminating process group"
            );
            terminate(&mut child).await;
            (ActionStatus::TimedOut, duration)
        }
    };

    let stdout = drain_capture(stdout_task).await;
    let stderr = drain_capture(stderr_task).await;

    match status {
        ActionStatus::Success => info!(
            action = %action.name,
            duration_ms = duration.as_millis() as u64,
            "action completed successfully"
        ),
        ActionStatus::TimedOut => error!(
            action = %action.name,
            duration_ms = duration.as_millis() as u64,
            captured_stdout_lines = stdout.len(),
            "action killed after timeout"
        ),
        ActionStatus::CommandNotFound => error!(
            action = %action.name,
            cmd = %action.command,
            "command not found (exit 127)"
        ),
        ActionStatus::PermissionDenied => error!(
            action = %action.name,
            cmd = %action.command,
            "command not executable (exit 126)"
        ),
        ActionStatus::Failed(code) => error!(
            action = %action.name,
            exit_code = code,
            duration_ms = duration.as_millis() as u64,
            "action failed"
        ),
        ActionStatus::MissingWorkdir => {}
    }

    ActionOutcome {
        name: action.name.clone(),
        status,
        duration,
        stdout,
        stderr,
    }
}

fn classify_spawn_error(err: &std::io::Error) -> ActionStatus {
    match err.kind() {
        std::io::ErrorKind::NotFound => ActionStatus::CommandNotFound,
        std::io::ErrorKind::PermissionDenied => ActionStatus::PermissionDenied,
        _ => ActionStatus::Failed(-1),
    }
}

fn log_spawn_failure(action: &PreparedAction, err: &std::io::Error, status: ActionStatus) {
    error!(
        action = %action.name,
        cmd = %action.command,
        working_dir = ?action.working_dir,
        error = %err,
        ?status,
        "failed to spawn action process"
    );

    // Surface directory permissions when they are the likely culprit.
    #[cfg(unix)]
    if status == ActionStatus::PermissionDenied
        && let Some(dir) = &action.working_dir
        && let Ok(meta) = std::fs::metadata(dir)
    {
        use std::os::unix::fs::MetadataExt;
        error!(
            working_dir = ?dir,
            mode = format!("{:o}", meta.mode() & 0o777),
            uid = meta.uid(),
            gid = meta.gid(),
            "working directory metadata"
        );
    }
}

fn classify_exit(exit: &std::process::ExitStatus) -> ActionStatus {
    if exit.success() {
        return ActionStatus::Success;
    }
    match exit.code() {
        // Shell conventions: 127 = command not found, 126 = not executable.
        Some(127) => ActionStatus::CommandNotFound,
        Some(126) => ActionStatus::PermissionDenied,
        Some(code) => ActionStatus::Failed(code),
        None => ActionStatus::Failed(-1),
    }
}

/// Kill the action's whole process group, then reap the shell.
async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // pgid == pid because the child was spawned with process_group(0).
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }

    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill action process");
    }
    let _ = child.wait().await;
}

/// Consume one output stream line by line into a bounded buffer, logging
/// each line at debug so buffers never fill unconsumed.
fn capture_lines<R>(
    stream: Option<R>,
    action_name: String,
    label: &'static str,
) -> Option<JoinHandle<Vec<String>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let stream = stream?;
    Some(tokio::spawn(async move {
        let reader = BufReader::new(stream);
        let mut lines = reader.lines();
        let mut captured = Vec::new();
        let mut dropped = 0usize;

        while let Ok(Some(line)) = lines.next_line().await {
            debug!(action = %action_name, "{label}: {line}");
            if captured.len() < MAX_CAPTURED_LINES {
                captured.push(line);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            captured.push(format!("[{dropped} further {label} lines dropped]"));
        }
        captured
    }))
}

async fn drain_capture(task: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout(READER_GRACE, task).await {
        Ok(Ok(lines)) => lines,
        Ok(Err(err)) => {
            warn!(error = %err, "output capture task failed");
            Vec::new()
        }
        Err(_) => {
            warn!("output capture task did not finish; output lost");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_carries_everything_through() {
        let cfg = ActionConfig {
            command: "echo hi".to_string(),
            working_dir: Some(PathBuf::from("/srv/app")),
            timeout_secs: Some(9),
            description: Some("say hello".to_string()),
        };
        let prepared = PreparedAction::from_config("greet", &cfg);
        assert_eq!(prepared.name, "greet");
        assert_eq!(prepared.command, "echo hi");
        assert_eq!(prepared.working_dir, Some(PathBuf::from("/srv/app")));
        assert_eq!(prepared.timeout, Duration::from_secs(9));
        assert_eq!(prepared.description.as_deref(), Some("say hello"));
    }

    #[test]
    fn explicit_timeout_wins() {
        assert_eq!(
            resolve_timeout(Some(7), "curl https://example.com"),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn heuristic_by_command_content() {
        assert_eq!(resolve_timeout(None, "curl -fsS x"), Duration::from_secs(60));
        assert_eq!(resolve_timeout(None, "wget x"), Duration::from_secs(60));
        assert_eq!(
            resolve_timeout(None, "kubectl rollout restart deploy/app"),
            Duration::from_secs(120)
        );
        assert_eq!(resolve_timeout(None, "git pull"), Duration::from_secs(180));
        assert_eq!(
            resolve_timeout(None, "docker compose up -d"),
            Duration::from_secs(300)
        );
        assert_eq!(
            resolve_timeout(None, "PODMAN build ."),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn unknown_commands_get_the_default() {
        assert_eq!(resolve_timeout(None, "systemctl restart app"), DEFAULT_TIMEOUT);
    }

    #[test]
    fn first_matching_heuristic_wins() {
        // "curl" appears before the git fallback in the table.
        assert_eq!(
            resolve_timeout(None, "git log | curl -d @- x"),
            Duration::from_secs(60)
        );
    }
}
