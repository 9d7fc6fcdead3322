//! Filesystem-backed knowledge store
//!
//! A directory tree of Markdown documents. Reads are lenient: a file that
//! cannot be read is skipped with a warning instead of failing the query.

use crate::errors::{ResolverError, Result};
use crate::knowledge::document::{render_document, DocumentMetadata, KnowledgeDocument};
use crate::knowledge::{KnowledgeStore, StoreQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Document file extension
const DOCUMENT_EXTENSION: &str = "md";

/// Knowledge store rooted at a directory of `.md` files
#[derive(Debug, Clone)]
pub struct FsKnowledgeStore {
    root: PathBuf,
}

impl FsKnowledgeStore {
    /// Create a store rooted at `root` (created lazily on first append)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All document paths under the root
    async fn document_paths(&self) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            if !root.exists() {
                return Vec::new();
            }
            WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("Skipping unreadable corpus entry: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| {
                    path.extension()
                        .map(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
                        .unwrap_or(false)
                })
                .collect()
        })
        .await
        .map_err(|e| ResolverError::Store(format!("Corpus scan failed: {}", e)))
    }

    /// Read and parse one document; `None` if unreadable
    async fn load(&self, path: PathBuf) -> Option<KnowledgeDocument> {
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping unreadable document {}: {}", path.display(), e);
                return None;
            }
        };

        let modified = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Some(KnowledgeDocument::parse(path, modified, raw))
    }

    async fn load_all(&self, paths: Vec<PathBuf>) -> Vec<KnowledgeDocument> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(document) = self.load(path).await {
                documents.push(document);
            }
        }
        documents
    }
}

#[async_trait]
impl KnowledgeStore for FsKnowledgeStore {
    async fn search(&self, query: &StoreQuery) -> Result<Vec<KnowledgeDocument>> {
        let paths = self.document_paths().await?;

        let documents = match query {
            StoreQuery::FileGlob(pattern) => {
                let pattern = Pattern::new(pattern)?;
                let options = MatchOptions {
                    case_sensitive: false,
                    ..Default::default()
                };
                let matched: Vec<PathBuf> = paths
                    .into_iter()
                    .filter(|path| {
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .map(|name| pattern.matches_with(name, options))
                            .unwrap_or(false)
                    })
                    .collect();
                self.load_all(matched).await
            }
            StoreQuery::Metadata { field, value } => self
                .load_all(paths)
                .await
                .into_iter()
                .filter(|doc| {
                    doc.metadata
                        .as_ref()
                        .map(|meta| meta.field_matches(field, value))
                        .unwrap_or(false)
                })
                .collect(),
            StoreQuery::Keywords(keywords) => {
                let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
                self.load_all(paths)
                    .await
                    .into_iter()
                    .filter(|doc| {
                        let text = doc.searchable_text();
                        keywords.iter().any(|k| text.contains(k.as_str()))
                    })
                    .collect()
            }
        };

        debug!(
            "Knowledge query {} returned {} documents",
            query.kind(),
            documents.len()
        );
        Ok(documents)
    }

    async fn append(&self, name: &str, metadata: &DocumentMetadata, body: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(ResolverError::Store(format!("Invalid document name: {}", name)));
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let file_name = if name.ends_with(".md") {
            name.to_string()
        } else {
            format!("{}.{}", name, DOCUMENT_EXTENSION)
        };
        let path = self.root.join(file_name);
        let contents = render_document(metadata, body)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                ResolverError::Store(format!("Refusing to write {}: {}", path.display(), e))
            })?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended knowledge document {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (FsKnowledgeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FsKnowledgeStore::new(temp_dir.path());
        (store, temp_dir)
    }

    fn meta(error_type: &str, subject: Option<&str>) -> DocumentMetadata {
        let mut meta = DocumentMetadata::new(error_type, "unknown");
        meta.subject = subject.map(str::to_string);
        meta
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let store = FsKnowledgeStore::new("/nonexistent/cascadefix/corpus");
        let docs = store
            .search(&StoreQuery::Keywords(vec!["anything".to_string()]))
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_glob() {
        let (store, _temp) = setup_store();
        store
            .append("module-not-found--pandas--1", &meta("ModuleNotFoundError", Some("pandas")), "## Solution\n\npip install pandas")
            .await
            .unwrap();
        store
            .append("module-not-found--numpy--1", &meta("ModuleNotFoundError", Some("numpy")), "## Solution\n\npip install numpy")
            .await
            .unwrap();

        let docs = store
            .search(&StoreQuery::FileGlob("module-not-found--pandas--*.md".to_string()))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].solution(), "pip install pandas");
    }

    #[tokio::test]
    async fn test_append_never_overwrites() {
        let (store, _temp) = setup_store();
        let m = meta("KeyError", None);
        store.append("dup", &m, "first").await.unwrap();
        let second = store.append("dup", &m, "second").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_append_rejects_path_names() {
        let (store, _temp) = setup_store();
        let result = store.append("../escape", &meta("KeyError", None), "x").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_metadata_query() {
        let (store, _temp) = setup_store();
        store.append("a", &meta("KeyError", None), "## Fix\n\nuse .get()").await.unwrap();
        store.append("b", &meta("ValueError", None), "## Fix\n\nvalidate").await.unwrap();

        let docs = store
            .search(&StoreQuery::Metadata {
                field: "error_type".to_string(),
                value: "keyerror".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].solution(), "use .get()");
    }

    #[tokio::test]
    async fn test_keyword_query_and_non_markdown_ignored() {
        let (store, temp) = setup_store();
        std::fs::write(temp.path().join("notes.txt"), "webpack webpack").unwrap();
        std::fs::write(temp.path().join("build.md"), "webpack build broke; clear cache").unwrap();
        std::fs::create_dir_all(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("nested/other.md"), "unrelated").unwrap();

        let docs = store
            .search(&StoreQuery::Keywords(vec!["WEBPACK".to_string()]))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].path.ends_with("build.md"));
    }
}
