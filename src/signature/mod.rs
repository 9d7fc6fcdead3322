//! Error signature extraction
//!
//! Deterministic, table-driven heuristics that turn a raw failure message
//! into the tokens every tier works with: an error type, the quoted
//! identifier, a category, the stage-1 file name key and a short keyword
//! list. Nothing here is learned; extending coverage means adding rows.

use crate::types::ErrorContext;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Maximum keywords kept per message
pub const MAX_KEYWORDS: usize = 5;

/// Maximum length of a file name slug
const MAX_SLUG_LEN: usize = 48;

static ERROR_TYPE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][A-Za-z0-9]*(?:Error|Exception))\b").expect("valid regex"));

static QUOTED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'([^'\n]+)'|"([^"\n]+)""#).expect("valid regex"));

static HTTP_STATUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bhttp(?:\s*error)?\s*:?\s*([45]\d{2})\b|\bstatus(?:\s+code)?\s*:?\s*([45]\d{2})\b|\b([45]\d{2})\s+(?:not found|unauthorized|forbidden|bad request|internal server error|bad gateway|service unavailable|gateway timeout|too many requests)\b",
    )
    .expect("valid regex")
});

/// Known substrings → stage-1 file name key (checked in order)
const FILENAME_KEYS: &[(&[&str], &str)] = &[
    (
        &["modulenotfounderror", "no module named", "cannot find module", "importerror"],
        "module-not-found",
    ),
    (&["permissionerror", "permission denied", "eacces"], "permission-denied"),
    (
        &["filenotfounderror", "no such file or directory", "enoent"],
        "file-not-found",
    ),
    (
        &["connectionrefused", "connection refused", "econnrefused"],
        "connection-refused",
    ),
];

/// Timeout needles are checked after HTTP codes so "504 Gateway Timeout" keys on the code
const TIMEOUT_NEEDLES: &[&str] = &["timeout", "timed out"];

/// Phrases that imply an error type when no `*Error` token is present
const ERROR_TYPE_PHRASES: &[(&str, &str)] = &[
    ("cannot find module", "ModuleNotFoundError"),
    ("no module named", "ModuleNotFoundError"),
    ("permission denied", "PermissionError"),
    ("no such file or directory", "FileNotFoundError"),
    ("connection refused", "ConnectionRefusedError"),
    ("timed out", "TimeoutError"),
    ("command not found", "CommandNotFound"),
];

/// Error types considered common enough to earn a confidence bonus
const COMMON_ERROR_TYPES: &[&str] = &[
    "ModuleNotFoundError",
    "ImportError",
    "PermissionError",
    "FileNotFoundError",
    "ConnectionRefusedError",
    "TimeoutError",
    "KeyError",
    "ValueError",
    "TypeError",
    "AttributeError",
    "SyntaxError",
    "NameError",
    "IndexError",
    "OSError",
    "CommandNotFound",
];

const STOPWORDS: &[&str] = &[
    "this", "that", "these", "those", "with", "from", "have", "been", "were", "what", "when",
    "where", "which", "while", "there", "their", "they", "them", "then", "than", "into", "onto",
    "about", "after", "before", "also", "could", "would", "should", "will", "your", "does",
    "error", "errors", "traceback", "most", "recent", "call", "last", "line",
];

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Dependency,
    Permission,
    Filesystem,
    Network,
    Http,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Filesystem => "filesystem",
            ErrorCategory::Network => "network",
            ErrorCategory::Http => "http",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whitelisted remediation intents (mutually exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixIntent {
    DependencyInstall,
    PermissionFix,
    FileCreation,
}

/// Tokens extracted from a failure message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSignature {
    pub message: String,
    pub tool: Option<String>,
    pub file_path: Option<String>,
    pub error_type: Option<String>,
    pub identifier: Option<String>,
    pub category: ErrorCategory,
    pub filename_key: Option<String>,
    pub keywords: Vec<String>,
}

impl ErrorSignature {
    /// Extract a signature from a raw message
    pub fn from_message(message: &str, tool: Option<&str>) -> Self {
        let filename_key = filename_key(message);
        let error_type = error_type(message);
        let category = categorize(filename_key.as_deref(), error_type.as_deref());

        Self {
            message: message.to_string(),
            tool: tool.map(str::to_string),
            file_path: None,
            error_type,
            identifier: quoted_identifier(message),
            category,
            filename_key,
            keywords: extract_keywords(message),
        }
    }

    /// Extract a signature from a failure snapshot
    pub fn from_context(context: &ErrorContext) -> Self {
        let mut signature = Self::from_message(&context.error_message, Some(&context.tool));
        signature.file_path = context.file_path.clone();
        signature
    }

    /// Whitelisted intent implied by the message, if any
    pub fn intent(&self) -> Option<FixIntent> {
        match self.filename_key.as_deref() {
            Some("module-not-found") => Some(FixIntent::DependencyInstall),
            Some("permission-denied") => Some(FixIntent::PermissionFix),
            Some("file-not-found") => Some(FixIntent::FileCreation),
            _ => None,
        }
    }

    /// Whether the error type is one of the common recognized types
    pub fn has_common_error_type(&self) -> bool {
        self.error_type
            .as_deref()
            .map(|t| COMMON_ERROR_TYPES.contains(&t))
            .unwrap_or(false)
    }

    /// Stem used when naming documents for this signature
    pub fn document_stem(&self) -> String {
        let key = self
            .filename_key
            .clone()
            .or_else(|| self.error_type.as_deref().map(slug))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "unclassified".to_string());
        format!("{}--{}", key, self.subject_slug())
    }

    /// Stage-1 glob for this signature, if the message has a known key;
    /// messages without an identifier only match `general` documents
    pub fn filename_glob(&self) -> Option<String> {
        let key = self.filename_key.as_deref()?;
        Some(format!("{}--{}--*.md", key, self.subject_slug()))
    }

    /// Identifier slug used in document names, `general` when absent
    fn subject_slug(&self) -> String {
        self.identifier
            .as_deref()
            .map(slug)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "general".to_string())
    }
}

/// Stage-1 file name key for a message
pub fn filename_key(message: &str) -> Option<String> {
    let lower = message.to_lowercase();

    for (needles, key) in FILENAME_KEYS {
        if needles.iter().any(|n| lower.contains(n)) {
            return Some((*key).to_string());
        }
    }

    if let Some(code) = http_status(message) {
        return Some(format!("http-{}", code));
    }

    if TIMEOUT_NEEDLES.iter().any(|n| lower.contains(n)) {
        return Some("timeout".to_string());
    }

    None
}

/// First HTTP 4xx/5xx status code mentioned in the message
pub fn http_status(message: &str) -> Option<u16> {
    let caps = HTTP_STATUS_PATTERN.captures(message)?;
    (1..=3)
        .filter_map(|i| caps.get(i))
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

/// Error type token (`FooError`), falling back to well-known phrases
pub fn error_type(message: &str) -> Option<String> {
    if let Some(caps) = ERROR_TYPE_PATTERN.captures(message) {
        return Some(caps[1].to_string());
    }

    let lower = message.to_lowercase();
    ERROR_TYPE_PHRASES
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, ty)| (*ty).to_string())
}

/// First single- or double-quoted token in the message
pub fn quoted_identifier(message: &str) -> Option<String> {
    let caps = QUOTED_PATTERN.captures(message)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Up to `MAX_KEYWORDS` distinct lowercase keywords longer than 3 chars
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|word| word.len() > 3)
        .filter(|word| !is_stopword(word))
        .filter(|word| seen.insert(word.to_string()))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Check if word is a stopword
fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Lowercase `[a-z0-9-]` slug suitable for file names
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
        if out.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    out.trim_matches('-').to_string()
}

fn categorize(filename_key: Option<&str>, error_type: Option<&str>) -> ErrorCategory {
    match filename_key {
        Some("module-not-found") => return ErrorCategory::Dependency,
        Some("permission-denied") => return ErrorCategory::Permission,
        Some("file-not-found") => return ErrorCategory::Filesystem,
        Some("connection-refused") => return ErrorCategory::Network,
        Some("timeout") => return ErrorCategory::Timeout,
        Some(key) if key.starts_with("http-") => return ErrorCategory::Http,
        _ => {}
    }

    match error_type {
        Some("ImportError") | Some("CommandNotFound") => ErrorCategory::Dependency,
        Some("OSError") | Some("IsADirectoryError") | Some("NotADirectoryError") => {
            ErrorCategory::Filesystem
        }
        Some(t) if t.starts_with("Connection") => ErrorCategory::Network,
        _ => ErrorCategory::Unknown,
    }
}
