//! Resolution and search result types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Historical knowledge (progressive search)
    Knowledge,
    /// Documentation / pattern lookup
    Documentation,
    /// Human escalation
    Human,
}

impl Tier {
    /// Tier number (1-3)
    pub fn number(&self) -> u8 {
        match self {
            Tier::Knowledge => 1,
            Tier::Documentation => 2,
            Tier::Human => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier {}", self.number())
    }
}

/// Where a solution came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// A knowledge store document
    KnowledgeBase { location: String },
    /// A documentation source answer
    Documentation { reference: String },
    /// No source (Tier 3)
    None,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::KnowledgeBase { location } => write!(f, "knowledge base ({})", location),
            ResolutionSource::Documentation { reference } => write!(f, "documentation ({})", reference),
            ResolutionSource::None => write!(f, "none"),
        }
    }
}

/// Why a high-confidence suggestion was not auto-applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// The circuit breaker is open
    CircuitOpen,
    /// The safety filter matched a blacklist rule
    Unsafe { rule: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::CircuitOpen => write!(f, "circuit breaker open"),
            BlockReason::Unsafe { rule } => write!(f, "blocked by safety rule '{}'", rule),
        }
    }
}

/// Tier-2 suggestion that was refused for auto-apply and escalated for review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedSuggestion {
    pub solution: String,
    pub confidence: f64,
    pub reason: BlockReason,
}

/// Outcome of a single `resolve_error` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub tier: Tier,
    pub solution: Option<String>,
    /// Heuristic correctness estimate in [0, 1]
    pub confidence: f64,
    pub source: ResolutionSource,
    pub search_time_ms: u64,
    /// Abstract cost units spent producing this resolution
    pub cost_estimate: u64,
    /// Approved for execution without human confirmation
    pub auto_applied: bool,
    /// Caller must confirm before applying the solution
    pub requires_confirmation: bool,
    /// Set when a Tier-2 HIGH suggestion was refused and escalated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockedSuggestion>,
}

impl Resolution {
    /// Tier-1 hit from the knowledge store
    pub fn knowledge(result: &SearchResult, auto_applied: bool) -> Self {
        Self {
            tier: Tier::Knowledge,
            solution: result.solution.clone(),
            confidence: result.confidence,
            source: ResolutionSource::KnowledgeBase {
                location: result.source_location.clone().unwrap_or_default(),
            },
            search_time_ms: result.search_time_ms,
            cost_estimate: result.cost,
            auto_applied,
            requires_confirmation: !auto_applied,
            blocked: None,
        }
    }

    /// Tier-2 suggestion
    pub fn documentation(
        solution: String,
        confidence: f64,
        reference: String,
        search_time_ms: u64,
        cost_estimate: u64,
        auto_applied: bool,
    ) -> Self {
        Self {
            tier: Tier::Documentation,
            solution: Some(solution),
            confidence,
            source: ResolutionSource::Documentation { reference },
            search_time_ms,
            cost_estimate,
            auto_applied,
            requires_confirmation: !auto_applied,
            blocked: None,
        }
    }

    /// Tier-3 escalation
    pub fn escalation(search_time_ms: u64, cost_estimate: u64) -> Self {
        Self {
            tier: Tier::Human,
            solution: None,
            confidence: 0.0,
            source: ResolutionSource::None,
            search_time_ms,
            cost_estimate,
            auto_applied: false,
            requires_confirmation: false,
            blocked: None,
        }
    }

    /// Attach a refused suggestion to a Tier-3 escalation
    pub fn with_blocked(mut self, blocked: BlockedSuggestion) -> Self {
        self.blocked = Some(blocked);
        self
    }

    /// Whether the wrapper may execute the solution without asking
    pub fn is_auto_appliable(&self) -> bool {
        self.auto_applied && self.solution.is_some()
    }

    /// Whether this resolution ended at the human tier
    pub fn is_escalation(&self) -> bool {
        self.tier == Tier::Human
    }
}

/// Progressive search stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    /// File name pattern lookup
    Filename,
    /// Structured metadata match
    Metadata,
    /// Keyword full-text fallback
    FullText,
}

impl SearchStage {
    /// All stages in cost order
    pub const ALL: [SearchStage; 3] = [SearchStage::Filename, SearchStage::Metadata, SearchStage::FullText];

    /// Stage number (1-3)
    pub fn number(&self) -> u8 {
        match self {
            SearchStage::Filename => 1,
            SearchStage::Metadata => 2,
            SearchStage::FullText => 3,
        }
    }

    /// Abstract cost units charged for running this stage
    pub fn cost_units(&self) -> u64 {
        match self {
            SearchStage::Filename => 100,
            SearchStage::Metadata => 500,
            SearchStage::FullText => 2000,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchStage::Filename => "filename",
            SearchStage::Metadata => "metadata",
            SearchStage::FullText => "full_text",
        }
    }
}

/// Outcome of a progressive search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub found: bool,
    pub solution: Option<String>,
    pub source_location: Option<String>,
    pub stage: SearchStage,
    pub search_time_ms: u64,
    pub cost: u64,
    pub confidence: f64,
}

impl SearchResult {
    /// Hit at `stage`
    pub fn hit(
        stage: SearchStage,
        solution: String,
        source_location: String,
        confidence: f64,
        search_time_ms: u64,
        cost: u64,
    ) -> Self {
        Self {
            found: true,
            solution: Some(solution),
            source_location: Some(source_location),
            stage,
            search_time_ms,
            cost,
            confidence,
        }
    }

    /// No match at any stage
    pub fn miss(search_time_ms: u64, cost: u64) -> Self {
        Self {
            found: false,
            solution: None,
            source_location: None,
            stage: SearchStage::FullText,
            search_time_ms,
            cost,
            confidence: 0.0,
        }
    }
}
