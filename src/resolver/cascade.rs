//! The three-tier cascade

use crate::docs::{DocAnswer, DocSource};
use crate::errors::{ResolverError, Result};
use crate::knowledge::document::{fenced_block, SAVED_ERROR_INFO, SAVED_SOLUTION_INFO};
use crate::knowledge::{DocumentMetadata, KnowledgeStore};
use crate::resolver::breaker::{BreakerSnapshot, CircuitBreaker, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::resolver::confidence::{ConfidenceBand, ConfidenceScorer};
use crate::resolver::safety::SafetyFilter;
use crate::search::{ProgressiveSearchEngine, SearchSettings};
use crate::signature::ErrorSignature;
use crate::statistics::{Statistics, StatisticsPersistence, StatisticsSnapshot, StatisticsTracker};
use crate::telemetry::SearchTelemetry;
use crate::types::{BlockReason, BlockedSuggestion, ErrorContext, Resolution, SearchResult};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Abstract cost units charged for a documentation query
pub const DOC_QUERY_COST: u64 = 5000;

/// Minimum search confidence for a Tier-1 hit
pub const DEFAULT_TIER1_MIN_CONFIDENCE: f64 = 0.8;

/// Hard limit on a documentation query
pub const DEFAULT_DOC_TIMEOUT: Duration = Duration::from_millis(2000);

/// Runtime settings for the resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub tier1_min_confidence: f64,
    /// Refuse to auto-apply Tier-1 solutions the safety filter rejects
    pub strict_tier1_safety: bool,
    pub doc_timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub search: SearchSettings,
    /// Additional case-insensitive safety patterns
    pub extra_safety_patterns: Vec<String>,
    /// Statistics file; `None` keeps statistics in memory only
    pub statistics_path: Option<PathBuf>,
    /// Search telemetry file; `None` keeps telemetry in memory only
    pub telemetry_path: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tier1_min_confidence: DEFAULT_TIER1_MIN_CONFIDENCE,
            strict_tier1_safety: true,
            doc_timeout: DEFAULT_DOC_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            search: SearchSettings::default(),
            extra_safety_patterns: Vec::new(),
            statistics_path: None,
            telemetry_path: None,
        }
    }
}

/// Mutable state shared by every call on one resolver
#[derive(Debug)]
struct ResolverState {
    breaker: CircuitBreaker,
    tracker: StatisticsTracker,
    /// Bumped on every statistics mutation
    revision: u64,
}

/// Three-tier cascading error resolver
pub struct ConfidenceCascadeResolver {
    search: ProgressiveSearchEngine,
    store: Arc<dyn KnowledgeStore>,
    docs: Arc<dyn DocSource>,
    safety: SafetyFilter,
    scorer: ConfidenceScorer,
    config: ResolverConfig,
    state: Mutex<ResolverState>,
    persistence: Option<StatisticsPersistence>,
    /// Highest statistics revision written to disk
    persisted_revision: Mutex<u64>,
}

impl ConfidenceCascadeResolver {
    /// Resolver with default settings and in-memory statistics
    pub fn new(store: Arc<dyn KnowledgeStore>, docs: Arc<dyn DocSource>) -> Self {
        Self::build(store, docs, ResolverConfig::default(), SafetyFilter::new())
    }

    /// Resolver with explicit settings, resuming persisted statistics if configured
    pub fn with_config(
        store: Arc<dyn KnowledgeStore>,
        docs: Arc<dyn DocSource>,
        config: ResolverConfig,
    ) -> Result<Self> {
        let safety = SafetyFilter::with_extra_patterns(&config.extra_safety_patterns)?;
        Ok(Self::build(store, docs, config, safety))
    }

    fn build(
        store: Arc<dyn KnowledgeStore>,
        docs: Arc<dyn DocSource>,
        config: ResolverConfig,
        safety: SafetyFilter,
    ) -> Self {
        let telemetry = config
            .telemetry_path
            .clone()
            .map(SearchTelemetry::with_persistence)
            .unwrap_or_default();
        let search =
            ProgressiveSearchEngine::with_settings(Arc::clone(&store), config.search.clone(), telemetry);

        let persistence = config.statistics_path.clone().map(StatisticsPersistence::new);
        let tracker = persistence
            .as_ref()
            .map(|p| StatisticsTracker::from_statistics(p.load()))
            .unwrap_or_default();

        let state = ResolverState {
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown),
            tracker,
            revision: 0,
        };

        Self {
            search,
            store,
            docs,
            safety,
            scorer: ConfidenceScorer::new(),
            config,
            state: Mutex::new(state),
            persistence,
            persisted_revision: Mutex::new(0),
        }
    }

    /// Resolve a failure through the tiers; never fails
    pub async fn resolve_error(&self, error_message: &str, context: &ErrorContext) -> Resolution {
        let start = Instant::now();
        let mut signature = ErrorSignature::from_message(error_message, Some(&context.tool));
        signature.file_path = context.file_path.clone();

        let search = self.search.search_signature(&signature).await;

        let resolution = match self.knowledge_tier(&search) {
            Some(resolution) => resolution,
            None => self.documentation_tier(&signature, &search, start).await,
        };

        info!(
            "{} resolution for {} failure: confidence={:.2} auto_applied={}",
            resolution.tier, context.tool, resolution.confidence, resolution.auto_applied
        );

        let (revision, stats) = {
            let mut state = self.lock_state();
            state.tracker.record(&resolution, context);
            state.revision += 1;
            (state.revision, state.tracker.statistics().clone())
        };
        self.persist(revision, &stats);

        if let Err(e) = self.search.telemetry().flush() {
            warn!("Failed to write search telemetry: {}", e);
        }

        resolution
    }

    fn knowledge_tier(&self, search: &SearchResult) -> Option<Resolution> {
        if !search.found || search.confidence < self.config.tier1_min_confidence {
            return None;
        }
        let solution = search.solution.as_deref()?;

        let mut auto_applied = true;
        if self.config.strict_tier1_safety {
            if let Some(rule) = self.safety.check(solution) {
                warn!(
                    "Tier-1 solution from {} matches safety rule '{}', requiring confirmation",
                    search.source_location.as_deref().unwrap_or("knowledge base"),
                    rule
                );
                auto_applied = false;
            }
        }

        Some(Resolution::knowledge(search, auto_applied))
    }

    async fn documentation_tier(
        &self,
        signature: &ErrorSignature,
        search: &SearchResult,
        start: Instant,
    ) -> Resolution {
        let cost = search.cost + DOC_QUERY_COST;
        let answer = self.query_docs(signature).await;
        let elapsed = elapsed_ms(start);

        let Some(answer) = answer else {
            debug!("No documentation answer, escalating");
            return Resolution::escalation(elapsed, cost);
        };

        let confidence = self.scorer.reconcile(signature, answer.confidence);
        let band = self.scorer.band(confidence);
        debug!(
            "Documentation answer '{}' scored {:.2} ({})",
            answer.solution, confidence, band
        );

        match band {
            ConfidenceBand::High => {
                if let Some(reason) = self.auto_apply_block(&answer.solution) {
                    warn!("Auto-apply refused ({}), escalating for review", reason);
                    return Resolution::escalation(elapsed, cost).with_blocked(BlockedSuggestion {
                        solution: answer.solution,
                        confidence,
                        reason,
                    });
                }
                Resolution::documentation(answer.solution, confidence, answer.reference, elapsed, cost, true)
            }
            ConfidenceBand::Medium => {
                Resolution::documentation(answer.solution, confidence, answer.reference, elapsed, cost, false)
            }
            ConfidenceBand::Low => Resolution::escalation(elapsed, cost),
        }
    }

    /// Safety first so an unsafe suggestion never consumes a half-open probe
    fn auto_apply_block(&self, solution: &str) -> Option<BlockReason> {
        if let Some(rule) = self.safety.check(solution) {
            return Some(BlockReason::Unsafe {
                rule: rule.to_string(),
            });
        }

        if !self.lock_state().breaker.check_permission() {
            return Some(BlockReason::CircuitOpen);
        }

        None
    }

    async fn query_docs(&self, signature: &ErrorSignature) -> Option<DocAnswer> {
        match timeout(self.config.doc_timeout, self.docs.query(signature)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("Documentation query failed, treating as no answer: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    "Documentation query exceeded {}ms, treating as no answer",
                    self.config.doc_timeout.as_millis()
                );
                None
            }
        }
    }

    /// Save a human-provided fix so an identical future error resolves at Tier 1
    pub async fn save_user_solution(
        &self,
        error_message: &str,
        solution: &str,
        context: Option<&ErrorContext>,
    ) -> Result<PathBuf> {
        let solution = solution.trim();
        if solution.is_empty() {
            return Err(ResolverError::Store("Refusing to save an empty solution".to_string()));
        }

        let tool = context.map(|c| c.tool.as_str());
        let signature = ErrorSignature::from_message(error_message, tool);
        let now = Utc::now();

        let mut metadata = DocumentMetadata::new(
            signature
                .error_type
                .clone()
                .unwrap_or_else(|| "Unclassified".to_string()),
            signature.category.as_str(),
        );
        metadata.subject = signature.identifier.clone();
        metadata.tool = tool.map(str::to_string);
        metadata.created = Some(now);
        metadata.tags = signature.keywords.clone();

        let id = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}--{}-{}.md",
            signature.document_stem(),
            now.format("%Y%m%dT%H%M%S"),
            &id[..8]
        );

        let body = solution_body(&signature, solution);
        let path = self.store.append(&name, &metadata, &body).await?;
        info!("Saved solution for {} to {}", signature.document_stem(), path.display());
        Ok(path)
    }

    /// Feed the outcome of an executed auto-apply to the circuit breaker
    pub fn record_apply_outcome(&self, success: bool) {
        let mut state = self.lock_state();
        if success {
            state.breaker.record_success();
        } else {
            state.breaker.record_failure();
        }
    }

    /// Count the outcome of an apply-and-retry cycle
    pub fn record_recovery(&self, recovered: bool) {
        let (revision, stats) = {
            let mut state = self.lock_state();
            state.tracker.record_recovery(recovered);
            state.revision += 1;
            (state.revision, state.tracker.statistics().clone())
        };
        self.persist(revision, &stats);
    }

    pub fn get_statistics(&self) -> StatisticsSnapshot {
        self.lock_state().tracker.snapshot()
    }

    /// Zero all statistics counters; the breaker and telemetry are untouched
    pub fn reset_statistics(&self) {
        let (revision, stats) = {
            let mut state = self.lock_state();
            state.tracker.reset();
            state.revision += 1;
            (state.revision, state.tracker.statistics().clone())
        };
        info!("Resolver statistics reset");
        self.persist(revision, &stats);
    }

    pub fn breaker_state(&self) -> BreakerSnapshot {
        self.lock_state().breaker.snapshot()
    }

    pub fn search_telemetry(&self) -> &SearchTelemetry {
        self.search.telemetry()
    }

    pub fn safety_filter(&self) -> &SafetyFilter {
        &self.safety
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a statistics snapshot unless a newer revision is already on disk
    fn persist(&self, revision: u64, stats: &Statistics) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let mut persisted = self
            .persisted_revision
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if revision <= *persisted {
            debug!("Skipping stale statistics revision {}", revision);
            return;
        }

        match persistence.save(stats) {
            Ok(()) => *persisted = revision,
            Err(e) => warn!(
                "Failed to persist statistics to {}: {}",
                persistence.path().display(),
                e
            ),
        }
    }
}

/// Markdown body of a saved solution document
fn solution_body(signature: &ErrorSignature, solution: &str) -> String {
    let title = match (&signature.error_type, &signature.identifier) {
        (Some(ty), Some(ident)) => format!("{}: {}", ty, ident),
        (Some(ty), None) => ty.clone(),
        (None, _) => "Saved solution".to_string(),
    };

    format!(
        "# {}\n\n## Error\n\n{}\n\n## Solution\n\n{}\n",
        title,
        fenced_block(SAVED_ERROR_INFO, signature.message.trim()),
        fenced_block(SAVED_SOLUTION_INFO, solution)
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::PatternDocSource;
    use crate::knowledge::FsKnowledgeStore;
    use crate::resolver::CircuitState;
    use crate::types::{ResolutionSource, Tier};
    use async_trait::async_trait;
    use tempfile::TempDir;

    const PANDAS: &str = "ModuleNotFoundError: No module named 'pandas'";

    fn resolver(dir: &TempDir) -> ConfidenceCascadeResolver {
        ConfidenceCascadeResolver::new(
            Arc::new(FsKnowledgeStore::new(dir.path().join("kb"))),
            Arc::new(PatternDocSource::new()),
        )
    }

    struct FailingDocs;

    #[async_trait]
    impl DocSource for FailingDocs {
        async fn query(&self, _signature: &ErrorSignature) -> Result<Option<DocAnswer>> {
            Err(ResolverError::DocSource("offline".to_string()))
        }
    }

    struct FixedDocs(&'static str, f64);

    #[async_trait]
    impl DocSource for FixedDocs {
        async fn query(&self, _signature: &ErrorSignature) -> Result<Option<DocAnswer>> {
            Ok(Some(DocAnswer::new(self.0, self.1, "fixed")))
        }
    }

    #[tokio::test]
    async fn test_tier2_high_auto_applies() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        let resolution = resolver
            .resolve_error(PANDAS, &ErrorContext::new("Bash", PANDAS))
            .await;

        assert_eq!(resolution.tier, Tier::Documentation);
        assert_eq!(resolution.solution.as_deref(), Some("pip install pandas"));
        assert!(resolution.confidence >= 0.95);
        assert!(resolution.auto_applied);
        assert!(resolution.cost_estimate >= DOC_QUERY_COST);
    }

    #[tokio::test]
    async fn test_doc_source_error_escalates() {
        let dir = TempDir::new().unwrap();
        let resolver = ConfidenceCascadeResolver::new(
            Arc::new(FsKnowledgeStore::new(dir.path())),
            Arc::new(FailingDocs),
        );

        let resolution = resolver
            .resolve_error(PANDAS, &ErrorContext::new("Bash", PANDAS))
            .await;

        assert_eq!(resolution.tier, Tier::Human);
        assert!(resolution.solution.is_none());
        assert_eq!(resolution.source, ResolutionSource::None);
        assert_eq!(resolver.get_statistics().tier3_escalations, 1);
    }

    #[tokio::test]
    async fn test_unsafe_high_suggestion_is_blocked() {
        let dir = TempDir::new().unwrap();
        let resolver = ConfidenceCascadeResolver::new(
            Arc::new(FsKnowledgeStore::new(dir.path())),
            Arc::new(FixedDocs("sudo pip install pandas", 0.99)),
        );

        let resolution = resolver
            .resolve_error(PANDAS, &ErrorContext::new("Bash", PANDAS))
            .await;

        assert_eq!(resolution.tier, Tier::Human);
        assert!(!resolution.auto_applied);
        let blocked = resolution.blocked.unwrap();
        assert_eq!(
            blocked.reason,
            BlockReason::Unsafe {
                rule: "privilege-escalation".to_string()
            }
        );

        let stats = resolver.get_statistics();
        assert_eq!(stats.blocked_auto_applies, 1);
        assert_eq!(stats.tier3_escalations, 1);
        assert_eq!(resolver.breaker_state().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_medium_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let resolver = ConfidenceCascadeResolver::new(
            Arc::new(FsKnowledgeStore::new(dir.path())),
            Arc::new(FixedDocs("pip install pandas", 0.80)),
        );

        let resolution = resolver
            .resolve_error(PANDAS, &ErrorContext::new("Bash", PANDAS))
            .await;

        assert_eq!(resolution.tier, Tier::Documentation);
        assert!(!resolution.auto_applied);
        assert!(resolution.requires_confirmation);
        assert_eq!(resolver.get_statistics().tier2_user_confirmed, 1);
    }

    #[tokio::test]
    async fn test_low_escalates() {
        let dir = TempDir::new().unwrap();
        let resolver = ConfidenceCascadeResolver::new(
            Arc::new(FsKnowledgeStore::new(dir.path())),
            Arc::new(FixedDocs("try again", 0.40)),
        );

        let resolution = resolver
            .resolve_error(PANDAS, &ErrorContext::new("Bash", PANDAS))
            .await;

        assert_eq!(resolution.tier, Tier::Human);
        assert!(resolution.blocked.is_none());
    }

    #[tokio::test]
    async fn test_save_rejects_empty_solution() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        let result = resolver.save_user_solution(PANDAS, "   ", None).await;
        assert!(matches!(result, Err(ResolverError::Store(_))));
    }

    #[tokio::test]
    async fn test_saved_document_name() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        let path = resolver
            .save_user_solution(PANDAS, "pip install pandas", None)
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("module-not-found--pandas--"), "{}", name);
        assert!(name.ends_with(".md"));
    }

    #[tokio::test]
    async fn test_statistics_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let config = ResolverConfig {
            statistics_path: Some(dir.path().join("stats.json")),
            ..Default::default()
        };

        {
            let resolver = ConfidenceCascadeResolver::with_config(
                Arc::new(FsKnowledgeStore::new(dir.path().join("kb"))),
                Arc::new(PatternDocSource::new()),
                config.clone(),
            )
            .unwrap();
            resolver
                .resolve_error(PANDAS, &ErrorContext::new("Bash", PANDAS))
                .await;
            resolver.record_recovery(true);
        }

        let resolver = ConfidenceCascadeResolver::with_config(
            Arc::new(FsKnowledgeStore::new(dir.path().join("kb"))),
            Arc::new(PatternDocSource::new()),
            config,
        )
        .unwrap();

        let stats = resolver.get_statistics();
        assert_eq!(stats.total_attempts, 1);
        assert_eq!(stats.tier2_auto_applied, 1);
        assert_eq!(stats.successful_recoveries, 1);
    }

    #[test]
    fn test_invalid_safety_pattern_rejected() {
        let config = ResolverConfig {
            extra_safety_patterns: vec!["(".to_string()],
            ..Default::default()
        };
        let result = ConfidenceCascadeResolver::with_config(
            Arc::new(FsKnowledgeStore::new("/nonexistent")),
            Arc::new(PatternDocSource::new()),
            config,
        );
        assert!(result.is_err());
    }
}
