//! Pattern-driven documentation source
//!
//! Table-driven remediation library:
//!
//! | Message                               | Suggestion                     | Confidence |
//! |---------------------------------------|--------------------------------|------------|
//! | `No module named 'X'`                 | `pip install <package for X>`  | 0.95       |
//! | `Cannot find module 'X'`              | `npm install X`                | 0.95       |
//! | `Permission denied: 'path'`           | `chmod` keyed by operation     | 0.95       |
//! | `No such file or directory: 'path'`   | `mkdir -p` / `touch`           | 0.85       |
//!
//! File creation stays below the auto-apply band.

use crate::docs::{DocAnswer, DocSource};
use crate::errors::Result;
use crate::signature::ErrorSignature;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Confidence for dependency installs and permission grants
pub const PATTERN_HIGH_CONFIDENCE: f64 = 0.95;

/// Confidence for filesystem entity creation (never auto-applied)
pub const FILE_CREATION_CONFIDENCE: f64 = 0.85;

static PYTHON_MODULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)no module named\s+['"]?([A-Za-z0-9_.]+)['"]?"#).expect("valid regex"));

static NODE_MODULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)cannot find module\s+['"]([^'"]+)['"]"#).expect("valid regex"));

static PERMISSION_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)permission denied(?::|,\s*\w+)?\s*['"]([^'"]+)['"]"#).expect("valid regex")
});

static PERMISSION_PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)([^\s:'"]+):\s*permission denied"#).expect("valid regex"));

static MISSING_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)no such file or directory(?::|,\s*\w+)?\s*['"]([^'"]+)['"]"#)
        .expect("valid regex")
});

static MISSING_PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)([^\s:'"]+):\s*no such file or directory"#).expect("valid regex"));

/// Installable npm package name, optionally scoped
static NPM_PACKAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[a-z0-9][a-z0-9._-]*/)?[a-z0-9][a-z0-9._~-]*$").expect("valid regex")
});

/// Node-style errno codes (`EACCES`) that prefix messages but are not paths
static ERRNO_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^E[A-Z]{2,}$").expect("valid regex"));

/// Import names whose distribution package is named differently
const PYTHON_PACKAGE_ALIASES: &[(&str, &str)] = &[
    ("cv2", "opencv-python"),
    ("PIL", "pillow"),
    ("sklearn", "scikit-learn"),
    ("yaml", "pyyaml"),
    ("bs4", "beautifulsoup4"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("jwt", "pyjwt"),
    ("magic", "python-magic"),
    ("serial", "pyserial"),
];

/// Extensions treated as executables for permission fixes
const EXECUTABLE_EXTENSIONS: &[&str] = &["sh", "bash", "zsh", "run", "bin", "appimage", "command"];

/// Tools that write files
const WRITING_TOOLS: &[&str] = &["write", "edit", "multiedit", "notebookedit"];

/// Kind of access a permission error blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl AccessKind {
    fn chmod_mode(&self) -> &'static str {
        match self {
            AccessKind::Read => "u+r",
            AccessKind::Write => "u+w",
            AccessKind::Execute => "+x",
        }
    }
}

/// Documentation source answering from the built-in pattern library
#[derive(Debug, Clone, Default)]
pub struct PatternDocSource;

impl PatternDocSource {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous lookup used by the async trait method
    pub fn lookup(&self, signature: &ErrorSignature) -> Option<DocAnswer> {
        python_module(signature)
            .or_else(|| node_module(signature))
            .or_else(|| permission_fix(signature))
            .or_else(|| file_creation(signature))
    }
}

#[async_trait]
impl DocSource for PatternDocSource {
    async fn query(&self, signature: &ErrorSignature) -> Result<Option<DocAnswer>> {
        Ok(self.lookup(signature))
    }
}

fn python_module(signature: &ErrorSignature) -> Option<DocAnswer> {
    let caps = PYTHON_MODULE.captures(&signature.message)?;
    let top_level = caps[1].split('.').next().filter(|m| !m.is_empty())?;
    let package = PYTHON_PACKAGE_ALIASES
        .iter()
        .find(|(import, _)| *import == top_level)
        .map(|(_, package)| (*package).to_string())
        .unwrap_or_else(|| top_level.replace('_', "-"));

    Some(DocAnswer::new(
        format!("pip install {}", package),
        PATTERN_HIGH_CONFIDENCE,
        "pattern:python-module-not-found",
    ))
}

fn node_module(signature: &ErrorSignature) -> Option<DocAnswer> {
    let caps = NODE_MODULE.captures(&signature.message)?;
    let specifier = caps[1].trim();

    // Relative and absolute paths are missing files, not packages
    if specifier.starts_with('.') || specifier.starts_with('/') {
        return None;
    }

    let mut parts = specifier.split('/');
    let package = if specifier.starts_with('@') {
        let scope = parts.next()?;
        let name = parts.next()?;
        format!("{}/{}", scope, name)
    } else {
        parts.next()?.to_string()
    };

    if !NPM_PACKAGE.is_match(&package) {
        return None;
    }

    Some(DocAnswer::new(
        format!("npm install {}", package),
        PATTERN_HIGH_CONFIDENCE,
        "pattern:node-module-not-found",
    ))
}

fn permission_fix(signature: &ErrorSignature) -> Option<DocAnswer> {
    let path = capture_path(&PERMISSION_QUOTED, &PERMISSION_PREFIXED, signature, "permission-denied")?;
    let kind = access_kind(signature, &path);

    Some(DocAnswer::new(
        format!("chmod {} {}", kind.chmod_mode(), shell_quote(&path)),
        PATTERN_HIGH_CONFIDENCE,
        "pattern:permission-denied",
    ))
}

fn file_creation(signature: &ErrorSignature) -> Option<DocAnswer> {
    let path = capture_path(&MISSING_QUOTED, &MISSING_PREFIXED, signature, "file-not-found")?;
    let target = Path::new(&path);

    let command = if target.extension().is_some() {
        match target.parent().map(|p| p.to_string_lossy().to_string()) {
            Some(parent) if !parent.is_empty() => format!(
                "mkdir -p {} && touch {}",
                shell_quote(&parent),
                shell_quote(&path)
            ),
            _ => format!("touch {}", shell_quote(&path)),
        }
    } else {
        format!("mkdir -p {}", shell_quote(&path))
    };

    Some(DocAnswer::new(
        command,
        FILE_CREATION_CONFIDENCE,
        "pattern:file-not-found",
    ))
}

/// Quoted path, else `path: <phrase>` prefix, else the context file path
fn capture_path(
    quoted: &Regex,
    prefixed: &Regex,
    signature: &ErrorSignature,
    key: &str,
) -> Option<String> {
    quoted
        .captures(&signature.message)
        .or_else(|| prefixed.captures(&signature.message))
        .map(|caps| caps[1].trim().to_string())
        .filter(|p| !p.is_empty() && !ERRNO_CODE.is_match(p))
        .or_else(|| {
            if signature.filename_key.as_deref() == Some(key) {
                signature.file_path.clone()
            } else {
                None
            }
        })
}

/// Which access the failing operation needed
pub fn access_kind(signature: &ErrorSignature, path: &str) -> AccessKind {
    let tool = signature.tool.as_deref().unwrap_or("").to_lowercase();
    let message = signature.message.to_lowercase();
    let extension = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());

    let executable_extension = extension
        .as_deref()
        .map(|ext| EXECUTABLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false);

    if tool == "bash" || executable_extension || message.contains("execute") || message.contains("exec ") {
        AccessKind::Execute
    } else if WRITING_TOOLS.contains(&tool.as_str()) || message.contains("write") {
        AccessKind::Write
    } else {
        AccessKind::Read
    }
}

/// Quote a path for `sh` unless it only contains safe characters
pub fn shell_quote(value: &str) -> String {
    let safe = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '~' | '+' | ':' | '@'));
    if safe && !value.is_empty() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
