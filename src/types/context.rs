//! Failure context types
//!
//! An `ErrorContext` is the immutable snapshot taken once per failure and
//! handed to the resolver. `ToolCall` describes the invocation a wrapper
//! guards, so contexts can be built without re-parsing the failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of a single tool failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Tool that failed (e.g. "Bash", "Write")
    pub tool: String,

    /// Diagnostic text of the failure
    pub error_message: String,

    /// File the tool was operating on, if known
    pub file_path: Option<String>,

    /// Command line the tool ran, if known
    pub command: Option<String>,

    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    /// Create context for a failure of `tool`
    pub fn new(tool: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            error_message: error_message.into(),
            file_path: None,
            command: None,
            timestamp: Utc::now(),
        }
    }

    /// Context for a bare message with no known tool
    pub fn from_message(error_message: impl Into<String>) -> Self {
        Self::new("unknown", error_message)
    }

    /// Set the file path
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Set the command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Short single-line preview of the message for history and logs
    pub fn preview(&self, max_chars: usize) -> String {
        let first_line = self.error_message.lines().next().unwrap_or("").trim();
        if first_line.chars().count() <= max_chars {
            first_line.to_string()
        } else {
            let truncated: String = first_line.chars().take(max_chars).collect();
            format!("{}…", truncated)
        }
    }
}

/// Description of a guarded tool invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCall {
    pub tool: String,
    pub file_path: Option<String>,
    pub command: Option<String>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ..Default::default()
        }
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Build the failure snapshot for this call
    pub fn error_context(&self, error_message: impl Into<String>) -> ErrorContext {
        ErrorContext {
            tool: self.tool.clone(),
            error_message: error_message.into(),
            file_path: self.file_path.clone(),
            command: self.command.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let ctx = ErrorContext::new("Bash", "boom")
            .with_file_path("deploy.sh")
            .with_command("./deploy.sh");
        assert_eq!(ctx.tool, "Bash");
        assert_eq!(ctx.file_path.as_deref(), Some("deploy.sh"));
        assert_eq!(ctx.command.as_deref(), Some("./deploy.sh"));
    }

    #[test]
    fn test_preview_truncates_first_line() {
        let ctx = ErrorContext::from_message("a very long first line\nsecond line");
        assert_eq!(ctx.preview(6), "a very…");
        assert_eq!(ctx.preview(100), "a very long first line");
    }

    #[test]
    fn test_tool_call_context() {
        let call = ToolCall::new("Write").with_file_path("out/report.txt");
        let ctx = call.error_context("Permission denied");
        assert_eq!(ctx.tool, "Write");
        assert_eq!(ctx.file_path.as_deref(), Some("out/report.txt"));
        assert!(ctx.command.is_none());
    }
}
