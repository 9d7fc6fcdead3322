//! Tier-1 progressive search over the knowledge store

pub mod engine;

pub use engine::{ProgressiveSearchEngine, SearchSettings, StageBudget};
