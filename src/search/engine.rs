//! Progressive search engine
//!
//! Three cost-ordered stages over the knowledge store, stopping at the
//! first hit:
//!
//! ```text
//! Stage 1  filename glob      conf 0.95   target <10ms   cost 100
//! Stage 2  metadata match     conf 0.85   target <500ms  cost 500
//! Stage 3  keyword overlap    conf ratio  target <5s     cost 2000
//! ```
//!
//! Documents pinned to a subject only match messages naming that subject.
//! Messages with no keywords fall back to a verbatim match against the error
//! text recorded in saved documents.
//!
//! Every stage runs under its own hard time limit. Store errors and
//! timeouts are contained: the stage counts as a miss and the search moves
//! on, so a broken corpus degrades to "no solution" instead of an error.

use crate::errors::{ResolverError, Result};
use crate::knowledge::{KnowledgeDocument, KnowledgeStore, StoreQuery};
use crate::signature::ErrorSignature;
use crate::telemetry::{SearchTelemetry, TelemetryEvent};
use crate::types::{SearchResult, SearchStage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Confidence assigned to a file name hit
pub const FILENAME_CONFIDENCE: f64 = 0.95;

/// Confidence assigned to a metadata hit
pub const METADATA_CONFIDENCE: f64 = 0.85;

/// Confidence for a verbatim match of a keyword-less message
pub const EXACT_MESSAGE_CONFIDENCE: f64 = 1.0;

/// Minimum keyword overlap ratio accepted by the full-text stage
pub const MIN_KEYWORD_OVERLAP: f64 = 0.5;

/// Latency target and hard limit for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBudget {
    /// Expected latency; exceeding it is only recorded
    pub target_ms: u64,
    /// Hard limit; the stage is abandoned past it
    pub limit_ms: u64,
}

impl StageBudget {
    pub const fn new(target_ms: u64, limit_ms: u64) -> Self {
        Self { target_ms, limit_ms }
    }
}

/// Per-stage budgets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub filename: StageBudget,
    pub metadata: StageBudget,
    pub full_text: StageBudget,
    pub min_keyword_overlap: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            filename: StageBudget::new(10, 1_000),
            metadata: StageBudget::new(500, 2_000),
            full_text: StageBudget::new(5_000, 5_000),
            min_keyword_overlap: MIN_KEYWORD_OVERLAP,
        }
    }
}

impl SearchSettings {
    pub fn budget(&self, stage: SearchStage) -> StageBudget {
        match stage {
            SearchStage::Filename => self.filename,
            SearchStage::Metadata => self.metadata,
            SearchStage::FullText => self.full_text,
        }
    }
}

/// A document accepted by a stage
#[derive(Debug, Clone)]
struct StageHit {
    solution: String,
    location: String,
    confidence: f64,
}

/// Progressive (filename → metadata → full-text) search over a knowledge store
pub struct ProgressiveSearchEngine {
    store: Arc<dyn KnowledgeStore>,
    settings: SearchSettings,
    telemetry: SearchTelemetry,
}

impl ProgressiveSearchEngine {
    /// Create engine with default budgets and in-memory telemetry
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self::with_settings(store, SearchSettings::default(), SearchTelemetry::new())
    }

    /// Create engine with custom budgets and telemetry sink
    pub fn with_settings(
        store: Arc<dyn KnowledgeStore>,
        settings: SearchSettings,
        telemetry: SearchTelemetry,
    ) -> Self {
        Self {
            store,
            settings,
            telemetry,
        }
    }

    /// Search for a previously solved error matching `error_message`
    pub async fn search(&self, error_message: &str) -> SearchResult {
        let signature = ErrorSignature::from_message(error_message, None);
        self.search_signature(&signature).await
    }

    /// Search with an already extracted signature
    pub async fn search_signature(&self, signature: &ErrorSignature) -> SearchResult {
        let start = Instant::now();
        let mut cost = 0u64;
        let mut result = None;

        for stage in SearchStage::ALL {
            let Some(query) = self.query_for(stage, signature) else {
                debug!("Skipping {} stage: nothing to query", stage.name());
                continue;
            };

            cost += stage.cost_units();
            if let Some(hit) = self.run_stage(stage, query, signature).await {
                result = Some(SearchResult::hit(
                    stage,
                    hit.solution,
                    hit.location,
                    hit.confidence,
                    elapsed_ms(start),
                    cost,
                ));
                break;
            }
        }

        let result = result.unwrap_or_else(|| SearchResult::miss(elapsed_ms(start), cost));

        self.telemetry.record(TelemetryEvent::SearchCompleted {
            found: result.found,
            stage: result.stage,
            duration_ms: result.search_time_ms,
            cost: result.cost,
            timestamp: Utc::now(),
        });

        debug!(
            "Search finished: found={} stage={} confidence={:.2} in {}ms",
            result.found,
            result.stage.number(),
            result.confidence,
            result.search_time_ms
        );

        result
    }

    /// Telemetry sink shared with this engine
    pub fn telemetry(&self) -> &SearchTelemetry {
        &self.telemetry
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Store query for a stage, or `None` when the signature has nothing to look up
    fn query_for(&self, stage: SearchStage, signature: &ErrorSignature) -> Option<StoreQuery> {
        match stage {
            SearchStage::Filename => signature.filename_glob().map(StoreQuery::FileGlob),
            SearchStage::Metadata => signature.error_type.as_ref().map(|ty| StoreQuery::Metadata {
                field: "error_type".to_string(),
                value: ty.clone(),
            }),
            SearchStage::FullText => {
                if !signature.keywords.is_empty() {
                    return Some(StoreQuery::Keywords(signature.keywords.clone()));
                }
                // Keyword-less messages are looked up verbatim
                let message = signature.message.trim();
                if message.is_empty() {
                    None
                } else {
                    Some(StoreQuery::Keywords(vec![message.to_lowercase()]))
                }
            }
        }
    }

    /// Run one stage under its hard limit, containing all faults
    async fn run_stage(
        &self,
        stage: SearchStage,
        query: StoreQuery,
        signature: &ErrorSignature,
    ) -> Option<StageHit> {
        let budget = self.settings.budget(stage);
        let start = Instant::now();

        let outcome = timeout(Duration::from_millis(budget.limit_ms), async {
            let documents = self.store.search(&query).await?;
            Ok::<_, ResolverError>(self.select(stage, documents, signature))
        })
        .await;

        let hit = match outcome {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!("Search stage {} failed, treating as miss: {}", stage.name(), e);
                None
            }
            Err(_) => {
                warn!(
                    "Search stage {} exceeded {}ms, treating as miss",
                    stage.name(),
                    budget.limit_ms
                );
                self.telemetry.record(TelemetryEvent::StageTimedOut {
                    stage,
                    limit_ms: budget.limit_ms,
                    timestamp: Utc::now(),
                });
                return None;
            }
        };

        let duration_ms = elapsed_ms(start);
        let over_target = duration_ms > budget.target_ms;
        if over_target {
            debug!(
                "Search stage {} took {}ms (target {}ms)",
                stage.name(),
                duration_ms,
                budget.target_ms
            );
        }

        self.telemetry.record(TelemetryEvent::StageCompleted {
            stage,
            hit: hit.is_some(),
            duration_ms,
            over_target,
            timestamp: Utc::now(),
        });

        hit
    }

    /// Pick the accepted document for a stage
    fn select(
        &self,
        stage: SearchStage,
        documents: Vec<KnowledgeDocument>,
        signature: &ErrorSignature,
    ) -> Option<StageHit> {
        let candidates: Vec<KnowledgeDocument> = documents
            .into_iter()
            .filter(|doc| subject_compatible(doc, signature))
            .collect();

        match stage {
            SearchStage::Filename => {
                best_for_subject(candidates, signature).map(|doc| to_hit(&doc, FILENAME_CONFIDENCE))
            }
            SearchStage::Metadata => {
                best_for_subject(candidates, signature).map(|doc| to_hit(&doc, METADATA_CONFIDENCE))
            }
            SearchStage::FullText if signature.keywords.is_empty() => {
                exact_message_match(candidates, &signature.message)
            }
            SearchStage::FullText => self.best_keyword_match(candidates, signature),
        }
    }

    /// Highest keyword overlap, ties broken by subject match, recency, then path
    fn best_keyword_match(
        &self,
        documents: Vec<KnowledgeDocument>,
        signature: &ErrorSignature,
    ) -> Option<StageHit> {
        let keywords = &signature.keywords;
        if keywords.is_empty() {
            return None;
        }

        let best = documents
            .into_iter()
            .filter(|doc| !doc.solution().is_empty())
            .map(|doc| (keyword_overlap(&doc, keywords), doc))
            .max_by(|(score_a, doc_a), (score_b, doc_b)| {
                score_a
                    .cmp(score_b)
                    .then_with(|| subject_order(doc_a, doc_b, signature))
                    .then_with(|| recency_order(doc_a, doc_b))
            })?;

        let (score, doc) = best;
        let ratio = score as f64 / keywords.len() as f64;
        if score == 0 || ratio < self.settings.min_keyword_overlap {
            debug!(
                "Best keyword overlap {}/{} below threshold",
                score,
                keywords.len()
            );
            return None;
        }

        Some(to_hit(&doc, ratio))
    }
}

/// Number of keywords present in the document
fn keyword_overlap(doc: &KnowledgeDocument, keywords: &[String]) -> usize {
    let text = doc.searchable_text();
    keywords
        .iter()
        .filter(|k| text.contains(k.to_lowercase().as_str()))
        .count()
}

/// Documents pinned to a subject only match messages about that subject
fn subject_compatible(doc: &KnowledgeDocument, signature: &ErrorSignature) -> bool {
    match (doc_subject(doc), signature.identifier.as_deref()) {
        (Some(subject), Some(identifier)) => subject.eq_ignore_ascii_case(identifier),
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn doc_subject(doc: &KnowledgeDocument) -> Option<&str> {
    doc.metadata.as_ref().and_then(|m| m.subject.as_deref())
}

/// Exact subject matches rank above documents with no subject
fn subject_order(a: &KnowledgeDocument, b: &KnowledgeDocument, signature: &ErrorSignature) -> Ordering {
    let pinned = |doc: &KnowledgeDocument| doc_subject(doc).is_some() && signature.identifier.is_some();
    pinned(a).cmp(&pinned(b))
}

/// Most specific compatible document, newest first within the same specificity
fn best_for_subject(
    documents: Vec<KnowledgeDocument>,
    signature: &ErrorSignature,
) -> Option<KnowledgeDocument> {
    documents
        .into_iter()
        .filter(|doc| !doc.solution().is_empty())
        .max_by(|a, b| subject_order(a, b, signature).then_with(|| recency_order(a, b)))
}

/// Saved document whose recorded error text equals the message
fn exact_message_match(documents: Vec<KnowledgeDocument>, message: &str) -> Option<StageHit> {
    let message = message.trim();
    documents
        .into_iter()
        .filter(|doc| doc.error_text().as_deref() == Some(message))
        .filter(|doc| !doc.solution().is_empty())
        .max_by(recency_order)
        .map(|doc| to_hit(&doc, EXACT_MESSAGE_CONFIDENCE))
}

/// Newer first; equal times fall back to the lexicographically smaller path
fn recency_order(a: &KnowledgeDocument, b: &KnowledgeDocument) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| b.path.cmp(&a.path))
}

fn to_hit(doc: &KnowledgeDocument, confidence: f64) -> StageHit {
    StageHit {
        solution: doc.solution(),
        location: doc.location(),
        confidence,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
