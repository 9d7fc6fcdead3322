//! Execution of auto-applied fixes

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default hard limit on a fix command
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters of stderr kept in a failed outcome
const MAX_STDERR_CHARS: usize = 2000;

/// Result of executing a fix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Succeeded,
    Failed { exit_code: Option<i32>, stderr: String },
    TimedOut,
    SpawnFailed(String),
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Succeeded)
    }
}

/// Executes a remediation command
#[async_trait]
pub trait FixApplier: Send + Sync {
    async fn apply(&self, command: &str, limit: Duration) -> ApplyOutcome;
}

/// Runs fixes through the platform shell
#[derive(Debug, Clone, Default)]
pub struct ShellApplier {
    working_dir: Option<PathBuf>,
}

impl ShellApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, command: &str) -> Command {
        #[cfg(unix)]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl FixApplier for ShellApplier {
    async fn apply(&self, command: &str, limit: Duration) -> ApplyOutcome {
        debug!("Applying fix: {}", command);

        let child = match self.command(command).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn fix command: {}", e);
                return ApplyOutcome::SpawnFailed(e.to_string());
            }
        };

        // Dropping the pending future on timeout kills the child
        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => ApplyOutcome::Succeeded,
            Ok(Ok(output)) => ApplyOutcome::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(MAX_STDERR_CHARS)
                    .collect(),
            },
            Ok(Err(e)) => ApplyOutcome::SpawnFailed(e.to_string()),
            Err(_) => {
                warn!("Fix command exceeded {}s and was killed", limit.as_secs());
                ApplyOutcome::TimedOut
            }
        }
    }
}

/// Shell command embedded in a solution text
///
/// A single-line solution is the command itself. Otherwise the lines of the
/// first fenced code block are joined with `&&`. Prose without a code block
/// yields `None`.
pub fn extract_command(solution: &str) -> Option<String> {
    let trimmed = solution.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() == 1 {
        let line = strip_prompt(lines[0]);
        return (!line.is_empty() && !line.starts_with("```")).then(|| line.to_string());
    }

    let mut in_block = false;
    let mut commands = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.starts_with("```") || line.starts_with("~~~") {
            if in_block {
                break;
            }
            in_block = true;
            continue;
        }
        if in_block && !line.is_empty() && !line.starts_with('#') {
            commands.push(strip_prompt(line));
        }
    }

    if commands.is_empty() {
        None
    } else {
        Some(commands.join(" && "))
    }
}

fn strip_prompt(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix("$ ").unwrap_or(line).trim()
}
