//! Heuristic confidence scoring for Tier-2 suggestions

use crate::signature::{ErrorSignature, FixIntent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower bound of the HIGH band (auto-apply candidates)
pub const HIGH_THRESHOLD: f64 = 0.95;

/// Lower bound of the MEDIUM band (suggest with confirmation)
pub const MEDIUM_THRESHOLD: f64 = 0.70;

/// Ceiling for file creation so it never reaches HIGH
pub const FILE_CREATION_CEILING: f64 = 0.94;

const BASE_SCORE: f64 = 0.50;
const INTENT_BONUS: f64 = 0.30;
const ERROR_TYPE_BONUS: f64 = 0.20;
const IDENTIFIER_BONUS: f64 = 0.15;
const KEYWORD_BONUS: f64 = 0.05;
const MAX_SCORED_KEYWORDS: usize = 4;

/// Confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            ConfidenceBand::High
        } else if score >= MEDIUM_THRESHOLD {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceBand::High => write!(f, "HIGH"),
            ConfidenceBand::Medium => write!(f, "MEDIUM"),
            ConfidenceBand::Low => write!(f, "LOW"),
        }
    }
}

/// Deterministic scorer over extracted error signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Heuristic score in [0, 1]
    pub fn score(&self, signature: &ErrorSignature) -> f64 {
        let mut score = BASE_SCORE;

        if signature.intent().is_some() {
            score += INTENT_BONUS;
        }
        if signature.has_common_error_type() {
            score += ERROR_TYPE_BONUS;
        }
        if signature.identifier.is_some() {
            score += IDENTIFIER_BONUS;
        }
        score += KEYWORD_BONUS * signature.keywords.len().min(MAX_SCORED_KEYWORDS) as f64;

        score.clamp(0.0, 1.0)
    }

    /// Final confidence for a documentation answer
    ///
    /// The lower of the source's own confidence and the heuristic score,
    /// with file creation held below the HIGH band.
    pub fn reconcile(&self, signature: &ErrorSignature, doc_confidence: f64) -> f64 {
        let combined = doc_confidence.min(self.score(signature)).clamp(0.0, 1.0);

        match signature.intent() {
            Some(FixIntent::FileCreation) => combined.min(FILE_CREATION_CEILING),
            _ => combined,
        }
    }

    pub fn band(&self, confidence: f64) -> ConfidenceBand {
        ConfidenceBand::from_score(confidence)
    }
}
