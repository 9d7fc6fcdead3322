//! cascadefix - three-tier cascading error resolution
//!
//! Intercepts failures from tool invocations and tries to remediate them
//! before a human has to.
//!
//! # Architecture
//!
//! - **Tier 1**: progressive search over a knowledge store of past fixes
//! - **Tier 2**: documentation lookup, confidence scoring, safety filter and
//!   circuit breaker gating auto-apply
//! - **Tier 3**: escalation to a human, whose fix is saved back to Tier 1

pub mod errors;
pub mod types;

// Extraction and lookup
pub mod signature;
pub mod knowledge;
pub mod docs;
pub mod search;
pub mod telemetry;

// Decision and bookkeeping
pub mod resolver;
pub mod statistics;
pub mod tools;

// Interface
pub mod cli;
pub mod config;

// Re-export commonly used types
pub use errors::{ResolverError, Result};
pub use resolver::{ConfidenceCascadeResolver, ResolverConfig};
pub use tools::{ToolInvocationWrapper, WrapperConfig};
pub use types::{ErrorContext, Resolution, Tier, ToolCall};
