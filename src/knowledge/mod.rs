//! Knowledge store: the append-only corpus of solved errors
//!
//! The resolver only talks to the `KnowledgeStore` trait, so the default
//! filesystem corpus can be swapped for a document or key-value store
//! without touching the cascade.

pub mod document;
pub mod filesystem;

pub use document::{DocumentMetadata, KnowledgeDocument};
pub use filesystem::FsKnowledgeStore;

use crate::errors::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Query understood by a knowledge store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreQuery {
    /// File name glob (e.g. `module-not-found--pandas--*.md`)
    FileGlob(String),
    /// Header field equality (case-insensitive)
    Metadata { field: String, value: String },
    /// Documents containing at least one of the keywords
    Keywords(Vec<String>),
}

impl StoreQuery {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreQuery::FileGlob(_) => "file_glob",
            StoreQuery::Metadata { .. } => "metadata",
            StoreQuery::Keywords(_) => "keywords",
        }
    }
}

/// Queryable, append-only corpus of previously solved errors
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Documents matching the query, in no particular order
    async fn search(&self, query: &StoreQuery) -> Result<Vec<KnowledgeDocument>>;

    /// Append a new document named `name`; never overwrites
    async fn append(&self, name: &str, metadata: &DocumentMetadata, body: &str) -> Result<PathBuf>;
}
