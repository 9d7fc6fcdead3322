//! Tier-2 documentation sources
//!
//! The resolver treats documentation lookup as a black box behind the
//! `DocSource` trait. The bundled `PatternDocSource` answers from a small
//! deterministic pattern library.

pub mod patterns;

pub use patterns::PatternDocSource;

use crate::errors::Result;
use crate::signature::ErrorSignature;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A suggested fix from a documentation source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocAnswer {
    /// Suggested remediation (usually a shell command)
    pub solution: String,
    /// Source's own confidence in [0, 1]
    pub confidence: f64,
    /// Where the answer came from, for display and statistics
    pub reference: String,
}

impl DocAnswer {
    pub fn new(solution: impl Into<String>, confidence: f64, reference: impl Into<String>) -> Self {
        Self {
            solution: solution.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reference: reference.into(),
        }
    }
}

/// Documentation lookup keyed by error signature
#[async_trait]
pub trait DocSource: Send + Sync {
    /// Suggested fix for the signature, or `None` if the source has nothing
    async fn query(&self, signature: &ErrorSignature) -> Result<Option<DocAnswer>>;
}
