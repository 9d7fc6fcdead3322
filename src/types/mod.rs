//! Type definitions module
//!
//! Core types shared by the resolver, the search engine and the wrapper.

pub mod context;
pub mod resolution;

// Re-export commonly used types
pub use context::{ErrorContext, ToolCall};
pub use resolution::{
    BlockReason, BlockedSuggestion, Resolution, ResolutionSource, SearchResult, SearchStage, Tier,
};
