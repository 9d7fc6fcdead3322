//! Safety filter for auto-applied fixes
//!
//! A candidate solution matching any blacklist rule is never executed
//! without a human in the loop.

use crate::errors::{ResolverError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Name given to rules added through configuration
pub const CUSTOM_RULE: &str = "custom";

/// Built-in blacklist as (rule name, case-insensitive pattern)
const BUILTIN_RULES: &[(&str, &str)] = &[
    ("privilege-escalation", r"\bsudo\b|\bsu\s+-|\bdoas\b|\bpkexec\b"),
    (
        "recursive-delete",
        r"\brm\s+(?:-[a-z]*r[a-z]*f[a-z]*|-[a-z]*f[a-z]*r[a-z]*|-r\s+-f|-f\s+-r|--recursive\s+--force|--force\s+--recursive)\b",
    ),
    (
        "destructive-sql",
        r"\bdrop\s+(?:table|database|schema)\b|\btruncate\s+(?:table\s+)?\w+|\bdelete\s+from\b|\balter\s+table\s+\S+\s+drop\b",
    ),
    ("disk-destruction", r"\bmkfs(?:\.\w+)?\b|\bdd\s+if=|>\s*/dev/sd[a-z]"),
    ("fork-bomb", r":\(\)\s*\{\s*:\|:&\s*\};\s*:"),
    (
        "pipe-to-shell",
        r"\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:ba|z|da)?sh\b",
    ),
    ("world-writable-root", r"\bchmod\s+(?:-R\s+)?777\s+/"),
    (
        "payment-or-secret",
        // Underscores separate words here so `STRIPE_KEY` matches and `secretstorage` does not
        r"(?:^|[^a-z0-9])(?:stripe|payments?|credit[\s_-]?cards?|api[_-]?keys?|secrets?|passwords?|passwd|tokens?|private[\s_-]?keys?)(?:[^a-z0-9]|$)",
    ),
];

static BUILTIN: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    BUILTIN_RULES
        .iter()
        .map(|(name, pattern)| {
            let regex = Regex::new(&format!("(?i){}", pattern)).expect("valid built-in safety rule");
            (*name, regex)
        })
        .collect()
});

/// Regex blacklist applied before any auto-apply
#[derive(Debug, Clone, Default)]
pub struct SafetyFilter {
    extra: Vec<Regex>,
}

impl SafetyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with additional case-insensitive patterns on top of the built-in rules
    pub fn with_extra_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let extra = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p.as_ref())).map_err(|e| {
                    ResolverError::ConfigError(format!("invalid safety pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { extra })
    }

    /// Whether the candidate may be auto-applied
    pub fn is_safe(&self, candidate: &str) -> bool {
        self.check(candidate).is_none()
    }

    /// Name of the first rule the candidate violates
    pub fn check(&self, candidate: &str) -> Option<&str> {
        if let Some((name, _)) = BUILTIN.iter().find(|(_, re)| re.is_match(candidate)) {
            return Some(name);
        }

        self.extra
            .iter()
            .any(|re| re.is_match(candidate))
            .then_some(CUSTOM_RULE)
    }

    pub fn rule_count(&self) -> usize {
        BUILTIN.len() + self.extra.len()
    }
}
