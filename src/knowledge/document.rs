//! Knowledge document format
//!
//! Documents are Markdown files with an optional TOML front matter block
//! delimited by `+++` lines:
//!
//! ~~~text
//! +++
//! error_type = "ModuleNotFoundError"
//! category = "dependency"
//! subject = "pandas"
//! +++
//!
//! # ModuleNotFoundError: pandas
//!
//! ## Solution
//!
//! pip install pandas
//! ~~~
//!
//! Saved solutions wrap the error and the fix in tagged fences (`text`,
//! `solution`) so their contents never read as headings.

use crate::errors::{ResolverError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Front matter delimiter
const FRONT_MATTER_FENCE: &str = "+++";

/// Headings recognized as the canonical solution section (lowercase)
const SOLUTION_HEADINGS: &[&str] = &["solution", "fix", "resolution", "workaround", "how to fix"];

/// Heading of the recorded error text in saved documents (lowercase)
const ERROR_HEADINGS: &[&str] = &["error"];

/// Fence info strings used when saving solutions and errors
pub const SAVED_SOLUTION_INFO: &str = "solution";
pub const SAVED_ERROR_INFO: &str = "text";

/// Structured metadata header of a knowledge document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub error_type: String,

    pub category: String,

    /// Identifier the solution is specific to (package, path, key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl DocumentMetadata {
    pub fn new(error_type: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            category: category.into(),
            subject: None,
            tool: None,
            created: None,
            tags: Vec::new(),
        }
    }

    /// Value of a named header field; `tags` matches any tag
    pub fn field_matches(&self, field: &str, value: &str) -> bool {
        let eq = |candidate: &str| candidate.eq_ignore_ascii_case(value);
        match field {
            "error_type" => eq(&self.error_type),
            "category" => eq(&self.category),
            "subject" => self.subject.as_deref().map(eq).unwrap_or(false),
            "tool" => self.tool.as_deref().map(eq).unwrap_or(false),
            "tags" => self.tags.iter().any(|t| eq(t)),
            _ => false,
        }
    }

    /// Render as a TOML header block
    pub fn to_front_matter(&self) -> Result<String> {
        let toml = toml::to_string(self)
            .map_err(|e| ResolverError::Metadata(format!("Failed to serialize metadata: {}", e)))?;
        Ok(format!("{fence}\n{toml}{fence}\n", fence = FRONT_MATTER_FENCE, toml = toml))
    }
}

/// A document read from the knowledge store
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeDocument {
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    /// Parsed header; `None` when absent or malformed
    pub metadata: Option<DocumentMetadata>,
    /// Full document text including any header
    pub body: String,
}

impl KnowledgeDocument {
    /// Build a document from raw text, parsing its header leniently
    pub fn parse(path: PathBuf, modified: DateTime<Utc>, raw: String) -> Self {
        let metadata = split_front_matter(&raw).0.and_then(|header| {
            match toml::from_str::<DocumentMetadata>(header) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    debug!("Ignoring malformed header in {}: {}", path.display(), e);
                    None
                }
            }
        });

        Self {
            path,
            modified,
            metadata,
            body: raw,
        }
    }

    /// Body with the metadata header stripped
    pub fn content(&self) -> &str {
        split_front_matter(&self.body).1
    }

    /// Canonical solution section, falling back to the whole content
    pub fn solution(&self) -> String {
        extract_solution_section(self.content())
            .unwrap_or_else(|| self.content().trim().to_string())
    }

    /// Error text recorded when the solution was saved, if any
    pub fn error_text(&self) -> Option<String> {
        extract_error_section(self.content())
    }

    /// Lowercased searchable text (header and content)
    pub fn searchable_text(&self) -> String {
        self.body.to_lowercase()
    }

    pub fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Split `(header, content)`; header is `None` when the text has no front matter
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix(FRONT_MATTER_FENCE) else {
        return (None, text);
    };
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let header = &rest[..offset];
            let content = &rest[offset + line.len()..];
            return (Some(header), content);
        }
        offset += line.len();
    }

    // Unterminated header: treat the whole text as content
    (None, text)
}

/// Text under the first recognized solution heading, up to the next heading
/// of the same or a higher level
pub fn extract_solution_section(content: &str) -> Option<String> {
    extract_section(content, SOLUTION_HEADINGS, SAVED_SOLUTION_INFO)
}

/// Verbatim error text recorded under an `Error` heading
pub fn extract_error_section(content: &str) -> Option<String> {
    extract_section(content, ERROR_HEADINGS, SAVED_ERROR_INFO)
}

/// Section body under the first heading in `headings`; a body that is a single
/// fenced block tagged `info` is returned without its fence
fn extract_section(content: &str, headings: &[&str], info: &str) -> Option<String> {
    let mut fence: Option<(char, usize)> = None;
    let mut level: Option<usize> = None;
    let mut section: Vec<&str> = Vec::new();

    for line in content.lines() {
        if let Some((marker, len)) = fence {
            if closes_fence(line, marker, len) {
                fence = None;
            }
            if level.is_some() {
                section.push(line);
            }
            continue;
        }

        if let Some((marker, len, _)) = opening_fence(line) {
            fence = Some((marker, len));
            if level.is_some() {
                section.push(line);
            }
            continue;
        }

        if let Some((heading_level, title)) = heading(line) {
            match level {
                Some(current) if heading_level <= current => break,
                Some(_) => section.push(line),
                None => {
                    let title = title.trim_end_matches(':').trim().to_lowercase();
                    if headings.contains(&title.as_str()) {
                        level = Some(heading_level);
                    }
                }
            }
            continue;
        }

        if level.is_some() {
            section.push(line);
        }
    }

    level?;
    let text = section.join("\n");
    let text = text.trim();
    let text = unwrap_fence(text, info).unwrap_or(text);
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// ATX heading level and title; `#!` and `#tag` lines are not headings
fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim()))
}

/// Opening code fence: marker char, run length and info string
fn opening_fence(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    Some((marker, len, trimmed[len..].trim()))
}

fn closes_fence(line: &str, marker: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.chars().count() >= len && trimmed.chars().all(|c| c == marker)
}

/// Inner text when `text` is exactly one fenced block tagged `info`
fn unwrap_fence<'a>(text: &'a str, info: &str) -> Option<&'a str> {
    let (first, rest) = text.split_once('\n')?;
    let (marker, len, tag) = opening_fence(first)?;
    if tag != info {
        return None;
    }
    let (inner, last) = rest.rsplit_once('\n').unwrap_or(("", rest));
    if !closes_fence(last, marker, len) {
        return None;
    }
    Some(inner.trim_end_matches('\r'))
}

/// `text` inside a backtick fence tagged `info`, long enough that no line of
/// `text` can close it
pub fn fenced_block(info: &str, text: &str) -> String {
    let longest_run = text
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest_run + 1).max(3));
    format!("{fence}{info}\n{text}\n{fence}", fence = fence, info = info, text = text)
}

/// Full document text for an appended solution
pub fn render_document(metadata: &DocumentMetadata, body: &str) -> Result<String> {
    Ok(format!("{}\n{}\n", metadata.to_front_matter()?, body.trim_end()))
}
