//! Search telemetry
//!
//! Long-run hit/miss/stage/latency counters for tuning the progressive
//! search. Kept separate from resolver statistics: these count searches,
//! not resolutions, and survive `reset_statistics`.

use crate::types::SearchStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Maximum retained recent events
const MAX_RECENT_EVENTS: usize = 256;

/// Telemetry event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A stage ran and found (or did not find) a document
    StageCompleted {
        stage: SearchStage,
        hit: bool,
        duration_ms: u64,
        over_target: bool,
        timestamp: DateTime<Utc>,
    },
    /// A stage exceeded its hard limit and was abandoned
    StageTimedOut {
        stage: SearchStage,
        limit_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A full progressive search finished
    SearchCompleted {
        found: bool,
        stage: SearchStage,
        duration_ms: u64,
        cost: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryStats {
    pub searches: u64,
    pub hits: u64,
    pub misses: u64,
    pub stage1_hits: u64,
    pub stage2_hits: u64,
    pub stage3_hits: u64,
    pub stage_runs: [u64; 3],
    pub stage_timeouts: u64,
    pub over_target: u64,
    pub total_search_ms: u64,
    pub total_cost: u64,
}

/// Telemetry collector
#[derive(Clone)]
pub struct SearchTelemetry {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    path: Option<PathBuf>,
}

impl SearchTelemetry {
    /// Create an in-memory collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            path: None,
        }
    }

    /// Create a collector persisted at `path`, resuming previous counters
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stats = load_stats(&path);
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(stats)),
            path: Some(path),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        // Update stats
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::StageCompleted { stage, hit, over_target, .. } => {
                    stats.stage_runs[(stage.number() - 1) as usize] += 1;
                    if *over_target {
                        stats.over_target += 1;
                    }
                    if *hit {
                        match stage {
                            SearchStage::Filename => stats.stage1_hits += 1,
                            SearchStage::Metadata => stats.stage2_hits += 1,
                            SearchStage::FullText => stats.stage3_hits += 1,
                        }
                    }
                }
                TelemetryEvent::StageTimedOut { stage, .. } => {
                    stats.stage_runs[(stage.number() - 1) as usize] += 1;
                    stats.stage_timeouts += 1;
                }
                TelemetryEvent::SearchCompleted { found, duration_ms, cost, .. } => {
                    stats.searches += 1;
                    if *found {
                        stats.hits += 1;
                    } else {
                        stats.misses += 1;
                    }
                    stats.total_search_ms += duration_ms;
                    stats.total_cost += cost;
                }
            }
        }

        // Store event
        let mut events = lock(&self.events);
        if events.len() >= MAX_RECENT_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    /// Fraction of searches that found a document
    pub fn hit_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        if stats.searches == 0 {
            0.0
        } else {
            stats.hits as f64 / stats.searches as f64
        }
    }

    /// Mean wall-clock time per search
    pub fn average_search_ms(&self) -> f64 {
        let stats = lock(&self.stats);
        if stats.searches == 0 {
            0.0
        } else {
            stats.total_search_ms as f64 / stats.searches as f64
        }
    }

    /// Write counters to the persistence file, if configured
    pub fn flush(&self) -> crate::errors::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let stats = self.get_stats();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&stats)?)?;
        Ok(())
    }
}

impl Default for SearchTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Counters stay usable even if a recording thread panicked
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn load_stats(path: &Path) -> TelemetryStats {
    match std::fs::read_to_string(path) {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Discarding corrupt search telemetry {}: {}", path.display(), e);
            TelemetryStats::default()
        }),
        Err(_) => TelemetryStats::default(),
    }
}
