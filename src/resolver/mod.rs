//! Confidence cascade resolution
//!
//! Tier 1 searches historical knowledge, Tier 2 consults documentation
//! through confidence scoring with a safety filter and circuit breaker
//! gating auto-apply, and Tier 3 escalates to a human.

pub mod breaker;
pub mod cascade;
pub mod confidence;
pub mod safety;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use cascade::{ConfidenceCascadeResolver, ResolverConfig, DOC_QUERY_COST};
pub use confidence::{ConfidenceBand, ConfidenceScorer};
pub use safety::SafetyFilter;
