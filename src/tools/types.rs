//! Tool outcome types
//!
//! The wrapper needs to know whether an arbitrary operation failed without
//! raising anything itself. `ToolOutcome` is that single classification
//! point, implemented for the result shapes tool invocations produce.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Result of a tool execution with an explicit success flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool name that was executed
    pub tool: String,

    /// Execution output (stdout or result data)
    pub output: String,

    /// Whether execution was successful
    pub success: bool,

    /// Execution duration in milliseconds
    pub duration_ms: u64,

    /// Optional error message if failed
    pub error: Option<String>,

    /// Exit code (for commands)
    pub exit_code: Option<i32>,
}

impl ToolResult {
    /// Create successful result
    pub fn success(tool: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            output: output.into(),
            success: true,
            duration_ms: duration.as_millis() as u64,
            error: None,
            exit_code: Some(0),
        }
    }

    /// Create failed result
    pub fn failure(tool: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            output: String::new(),
            success: false,
            duration_ms: duration.as_millis() as u64,
            error: Some(error.into()),
            exit_code: None,
        }
    }

    /// Create result from a finished command
    pub fn with_exit_code(
        tool: impl Into<String>,
        output: impl Into<String>,
        exit_code: i32,
        duration: Duration,
    ) -> Self {
        Self {
            tool: tool.into(),
            output: output.into(),
            success: exit_code == 0,
            duration_ms: duration.as_millis() as u64,
            error: if exit_code != 0 {
                Some(format!("Command exited with code {}", exit_code))
            } else {
                None
            },
            exit_code: Some(exit_code),
        }
    }
}

/// Captured output of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit status; `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(status: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Description of a detected failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Diagnostic text handed to the resolver
    pub message: String,
    pub exit_code: Option<i32>,
}

impl ToolFailure {
    pub fn new(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }
}

/// Classifies an operation result as success or failure
pub trait ToolOutcome {
    /// `Some` when the result represents a failure
    fn failure(&self) -> Option<ToolFailure>;
}

impl ToolOutcome for ToolResult {
    fn failure(&self) -> Option<ToolFailure> {
        let exit_ok = self.exit_code.map(|code| code == 0).unwrap_or(true);
        if self.success && exit_ok {
            return None;
        }

        let error = self.error.as_deref().map(str::trim).unwrap_or("");
        let output = self.output.trim();
        let message = match (error.is_empty(), output.is_empty()) {
            (false, false) => format!("{}\n{}", output, error),
            (false, true) => error.to_string(),
            (true, false) => output.to_string(),
            (true, true) => format!("{} failed", self.tool),
        };

        Some(ToolFailure::new(message, self.exit_code))
    }
}

impl ToolOutcome for CommandOutput {
    fn failure(&self) -> Option<ToolFailure> {
        if self.is_success() {
            return None;
        }

        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        let message = if !stderr.is_empty() {
            stderr.to_string()
        } else if !stdout.is_empty() {
            stdout.to_string()
        } else {
            match self.status {
                Some(code) => format!("Command exited with code {}", code),
                None => "Command terminated by signal".to_string(),
            }
        };

        Some(ToolFailure::new(message, self.status))
    }
}

impl<T, E: Display> ToolOutcome for std::result::Result<T, E> {
    fn failure(&self) -> Option<ToolFailure> {
        match self {
            Ok(_) => None,
            Err(e) => Some(ToolFailure::new(e.to_string(), None)),
        }
    }
}
