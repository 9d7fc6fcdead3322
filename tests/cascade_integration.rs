//! Resolver integration tests
//!
//! End-to-end cascade behavior over a real filesystem knowledge store and
//! the pattern documentation source.

use async_trait::async_trait;
use cascadefix::docs::PatternDocSource;
use cascadefix::knowledge::{DocumentMetadata, FsKnowledgeStore, KnowledgeDocument, KnowledgeStore, StoreQuery};
use cascadefix::resolver::{CircuitState, ConfidenceCascadeResolver, ResolverConfig};
use cascadefix::statistics::StatisticsPersistence;
use cascadefix::types::{BlockReason, ErrorContext, ResolutionSource, Tier};
use cascadefix::Result;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const PANDAS: &str = "ModuleNotFoundError: No module named 'pandas'";

/// Store wrapper recording the kind of every search query
struct CountingStore {
    inner: FsKnowledgeStore,
    queries: Mutex<Vec<&'static str>>,
}

impl CountingStore {
    fn new(root: PathBuf) -> Self {
        Self {
            inner: FsKnowledgeStore::new(root),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn take_queries(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.queries.lock().unwrap())
    }
}

#[async_trait]
impl KnowledgeStore for CountingStore {
    async fn search(&self, query: &StoreQuery) -> Result<Vec<KnowledgeDocument>> {
        self.queries.lock().unwrap().push(query.kind());
        self.inner.search(query).await
    }

    async fn append(&self, name: &str, metadata: &DocumentMetadata, body: &str) -> Result<PathBuf> {
        self.inner.append(name, metadata, body).await
    }
}

fn resolver(dir: &TempDir) -> ConfidenceCascadeResolver {
    ConfidenceCascadeResolver::new(
        Arc::new(FsKnowledgeStore::new(dir.path().join("knowledge"))),
        Arc::new(PatternDocSource::new()),
    )
}

fn bash(message: &str) -> ErrorContext {
    ErrorContext::new("Bash", message)
}

#[tokio::test]
async fn test_module_not_found_scenario() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;

    assert_eq!(resolution.tier, Tier::Documentation);
    assert_eq!(resolution.solution.as_deref(), Some("pip install pandas"));
    assert!((resolution.confidence - 0.95).abs() < 1e-9);
    assert!(resolution.auto_applied);
    assert!(!resolution.requires_confirmation);
}

#[tokio::test]
async fn test_permission_denied_scenario() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let message = "PermissionError: [Errno 13] Permission denied: 'deploy.sh'";

    let resolution = resolver.resolve_error(message, &bash(message)).await;

    assert_eq!(resolution.tier, Tier::Documentation);
    assert_eq!(resolution.solution.as_deref(), Some("chmod +x deploy.sh"));
    assert!(resolution.confidence >= 0.95);
    assert!(resolution.auto_applied);
}

#[tokio::test]
async fn test_missing_file_is_medium_with_confirmation() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let message = "FileNotFoundError: [Errno 2] No such file or directory: 'logs/app.log'";

    let resolution = resolver.resolve_error(message, &bash(message)).await;

    assert_eq!(resolution.tier, Tier::Documentation);
    assert_eq!(
        resolution.solution.as_deref(),
        Some("mkdir -p logs && touch logs/app.log")
    );
    assert!(!resolution.auto_applied);
    assert!(resolution.requires_confirmation);
    assert!(resolution.confidence >= 0.70 && resolution.confidence < 0.95);
}

#[tokio::test]
async fn test_unknown_error_escalates_to_human() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let message = "the flux capacitor hiccupped";

    let resolution = resolver.resolve_error(message, &bash(message)).await;

    assert_eq!(resolution.tier, Tier::Human);
    assert!(resolution.solution.is_none());
    assert_eq!(resolution.source, ResolutionSource::None);
    assert!(!resolution.auto_applied);
}

#[tokio::test]
async fn test_save_then_resolve_is_tier1() {
    let cases = [
        (
            "KeyError: 'user_id' while processing request",
            "Check the request payload includes user_id before lookup",
        ),
        (PANDAS, "# reinstall into the venv\npip install pandas"),
        (
            "ValueError: invalid literal for int() with base 10: 'abc'",
            "## Cause\n\nThe CSV has a header row.\n\n```python\nint(row[1])\n```",
        ),
        (
            "PermissionError: [Errno 13] Permission denied: 'deploy.sh'",
            "```bash\n# make it runnable\nchmod 755 deploy.sh\n```",
        ),
        ("bad arg", "pass --flag"),
        ("request timed out", "raise the client timeout to 30s"),
    ];

    for (message, solution) in cases {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir);

        resolver
            .save_user_solution(message, solution, Some(&bash(message)))
            .await
            .unwrap();

        let resolution = resolver.resolve_error(message, &bash(message)).await;
        assert_eq!(resolution.tier, Tier::Knowledge, "{}", message);
        assert_eq!(resolution.solution.as_deref(), Some(solution), "{}", message);
        assert!(matches!(resolution.source, ResolutionSource::KnowledgeBase { .. }));
    }
}

#[tokio::test]
async fn test_saved_solutions_share_one_store() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let saved = [
        ("KeyError: 'user_id'", "use .get('user_id')"),
        ("KeyError raised in handler", "check handler dict"),
        ("KeyError: 'order_id'", "backfill order ids"),
        ("bad arg", "pass --flag"),
        ("bad arg given", "drop the extra argument"),
    ];

    for (message, solution) in saved {
        resolver
            .save_user_solution(message, solution, None)
            .await
            .unwrap();
        // Distinct modification times so recency is not a tie
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    for (message, solution) in saved {
        let resolution = resolver.resolve_error(message, &bash(message)).await;
        assert_eq!(resolution.tier, Tier::Knowledge, "{}", message);
        assert_eq!(resolution.solution.as_deref(), Some(solution), "{}", message);
    }
}

#[tokio::test]
async fn test_saved_fix_not_reused_without_identifier() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    resolver
        .save_user_solution(
            "PermissionError: [Errno 13] Permission denied: 'deploy.sh'",
            "chmod +x deploy.sh",
            None,
        )
        .await
        .unwrap();

    let message = "PermissionError: [Errno 13] Permission denied";
    let context = ErrorContext::new("Write", message).with_file_path("out/report.csv");
    let resolution = resolver.resolve_error(message, &context).await;

    assert_ne!(resolution.tier, Tier::Knowledge);
    assert_ne!(resolution.solution.as_deref(), Some("chmod +x deploy.sh"));
}

#[tokio::test]
async fn test_injected_node_module_name_is_not_suggested() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let message = "Error: Cannot find module 'x;touch /tmp/owned'";

    let resolution = resolver.resolve_error(message, &bash(message)).await;

    assert!(!resolution.auto_applied);
    assert!(resolution
        .solution
        .as_deref()
        .map(|s| !s.contains("touch"))
        .unwrap_or(true));
}

#[tokio::test]
async fn test_saved_fix_overrides_documentation() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    resolver
        .save_user_solution(PANDAS, "poetry add pandas", None)
        .await
        .unwrap();

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
    assert_eq!(resolution.tier, Tier::Knowledge);
    assert_eq!(resolution.solution.as_deref(), Some("poetry add pandas"));
    assert!(resolution.auto_applied);
}

#[tokio::test]
async fn test_saved_fix_is_specific_to_identifier() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    resolver
        .save_user_solution(PANDAS, "poetry add pandas", None)
        .await
        .unwrap();

    let numpy = "ModuleNotFoundError: No module named 'numpy'";
    let resolution = resolver.resolve_error(numpy, &bash(numpy)).await;
    assert_ne!(resolution.solution.as_deref(), Some("poetry add pandas"));
}

#[tokio::test]
async fn test_stage1_hit_skips_later_stages() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CountingStore::new(dir.path().join("knowledge")));
    let resolver = ConfidenceCascadeResolver::new(store.clone(), Arc::new(PatternDocSource::new()));

    resolver
        .save_user_solution(PANDAS, "pip install pandas==2.1", None)
        .await
        .unwrap();
    store.take_queries();

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;

    assert_eq!(resolution.tier, Tier::Knowledge);
    assert_eq!(store.take_queries(), vec!["file_glob"]);
    assert_eq!(resolution.cost_estimate, 100);
}

#[tokio::test]
async fn test_unsafe_tier1_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    resolver
        .save_user_solution(PANDAS, "sudo pip install pandas", None)
        .await
        .unwrap();

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
    assert_eq!(resolution.tier, Tier::Knowledge);
    assert!(!resolution.auto_applied);
    assert!(resolution.requires_confirmation);
}

#[tokio::test]
async fn test_lenient_tier1_skips_safety() {
    let dir = TempDir::new().unwrap();
    let config = ResolverConfig {
        strict_tier1_safety: false,
        ..Default::default()
    };
    let resolver = ConfidenceCascadeResolver::with_config(
        Arc::new(FsKnowledgeStore::new(dir.path().join("knowledge"))),
        Arc::new(PatternDocSource::new()),
        config,
    )
    .unwrap();

    resolver
        .save_user_solution(PANDAS, "sudo pip install pandas", None)
        .await
        .unwrap();

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
    assert!(resolution.auto_applied);
}

#[tokio::test]
async fn test_attempts_counted_once_per_call() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let messages = [
        PANDAS,
        "PermissionError: [Errno 13] Permission denied: 'deploy.sh'",
        "FileNotFoundError: [Errno 2] No such file or directory: 'out/data.csv'",
        "the flux capacitor hiccupped",
        "Error: Cannot find module 'express'",
    ];

    for (i, message) in messages.iter().enumerate() {
        resolver.resolve_error(message, &bash(message)).await;

        let stats = resolver.get_statistics();
        assert_eq!(stats.total_attempts, (i + 1) as u64);
        assert_eq!(
            stats.tier1_hits + stats.tier2_hits + stats.tier3_escalations,
            stats.total_attempts
        );
        assert_eq!(
            stats.tier2_auto_applied + stats.tier2_user_confirmed,
            stats.tier2_hits
        );
    }

    let stats = resolver.get_statistics();
    assert_eq!(stats.tier2_auto_applied, 3);
    assert_eq!(stats.tier2_user_confirmed, 1);
    assert_eq!(stats.tier3_escalations, 1);
    assert!((stats.automation_rate - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_open_circuit_blocks_fourth_auto_apply() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    for _ in 0..3 {
        let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
        assert!(resolution.auto_applied);
        resolver.record_apply_outcome(false);
    }
    assert_eq!(resolver.breaker_state().state, CircuitState::Open);

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
    assert!(!resolution.auto_applied);
    assert_eq!(resolution.tier, Tier::Human);

    let blocked = resolution.blocked.expect("blocked suggestion attached");
    assert_eq!(blocked.reason, BlockReason::CircuitOpen);
    assert_eq!(blocked.solution, "pip install pandas");

    let stats = resolver.get_statistics();
    assert_eq!(stats.blocked_auto_applies, 1);
    assert_eq!(stats.tier2_auto_applied, 3);
    assert_eq!(stats.tier3_escalations, 1);
}

#[tokio::test]
async fn test_circuit_recovers_after_cooldown() {
    let dir = TempDir::new().unwrap();
    let config = ResolverConfig {
        cooldown: Duration::from_millis(500),
        ..Default::default()
    };
    let resolver = ConfidenceCascadeResolver::with_config(
        Arc::new(FsKnowledgeStore::new(dir.path().join("knowledge"))),
        Arc::new(PatternDocSource::new()),
        config,
    )
    .unwrap();

    for _ in 0..3 {
        resolver.record_apply_outcome(false);
    }
    assert!(!resolver.resolve_error(PANDAS, &bash(PANDAS)).await.auto_applied);

    tokio::time::sleep(Duration::from_millis(600)).await;

    // Exactly one probe is admitted
    assert!(resolver.resolve_error(PANDAS, &bash(PANDAS)).await.auto_applied);
    assert_eq!(resolver.breaker_state().state, CircuitState::HalfOpen);
    assert!(!resolver.resolve_error(PANDAS, &bash(PANDAS)).await.auto_applied);

    resolver.record_apply_outcome(true);
    assert_eq!(resolver.breaker_state().state, CircuitState::Closed);
    assert!(resolver.resolve_error(PANDAS, &bash(PANDAS)).await.auto_applied);
}

#[tokio::test]
async fn test_unsafe_doc_answer_does_not_touch_breaker() {
    let dir = TempDir::new().unwrap();
    let config = ResolverConfig {
        extra_safety_patterns: vec!["pip\\s+install".to_string()],
        ..Default::default()
    };
    let resolver = ConfidenceCascadeResolver::with_config(
        Arc::new(FsKnowledgeStore::new(dir.path().join("knowledge"))),
        Arc::new(PatternDocSource::new()),
        config,
    )
    .unwrap();

    let resolution = resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
    assert_eq!(resolution.tier, Tier::Human);
    assert!(matches!(
        resolution.blocked.map(|b| b.reason),
        Some(BlockReason::Unsafe { .. })
    ));
    assert_eq!(resolver.breaker_state().consecutive_failures, 0);
}

#[tokio::test]
async fn test_reset_statistics() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    resolver.resolve_error(PANDAS, &bash(PANDAS)).await;
    resolver.reset_statistics();

    let stats = resolver.get_statistics();
    assert_eq!(stats.total_attempts, 0);
    assert!(stats.history.is_empty());
    assert_eq!(stats.automation_rate, 0.0);
    assert_eq!(resolver.search_telemetry().get_stats().searches, 1);
}

#[tokio::test]
async fn test_corrupt_statistics_file_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let stats_path = dir.path().join("statistics.json");
    std::fs::write(&stats_path, "not json at all").unwrap();

    let config = ResolverConfig {
        statistics_path: Some(stats_path.clone()),
        ..Default::default()
    };
    let resolver = ConfidenceCascadeResolver::with_config(
        Arc::new(FsKnowledgeStore::new(dir.path().join("knowledge"))),
        Arc::new(PatternDocSource::new()),
        config,
    )
    .unwrap();

    assert_eq!(resolver.get_statistics().total_attempts, 0);
    resolver.resolve_error(PANDAS, &bash(PANDAS)).await;

    let persisted = StatisticsPersistence::new(&stats_path).load();
    assert_eq!(persisted.total_attempts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolutions_are_all_counted() {
    let dir = TempDir::new().unwrap();
    let stats_path = dir.path().join("statistics.json");
    let config = ResolverConfig {
        statistics_path: Some(stats_path.clone()),
        ..Default::default()
    };
    let resolver = Arc::new(
        ConfidenceCascadeResolver::with_config(
            Arc::new(FsKnowledgeStore::new(dir.path().join("knowledge"))),
            Arc::new(PatternDocSource::new()),
            config,
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..20 {
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            let message = if i % 2 == 0 {
                PANDAS.to_string()
            } else {
                format!("mystery failure number {}", i)
            };
            resolver.resolve_error(&message, &bash(&message)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = resolver.get_statistics();
    assert_eq!(stats.total_attempts, 20);
    assert_eq!(stats.tier1_hits + stats.tier2_hits + stats.tier3_escalations, 20);

    let persisted = StatisticsPersistence::new(&stats_path).load();
    assert_eq!(persisted.total_attempts, 20);
}
