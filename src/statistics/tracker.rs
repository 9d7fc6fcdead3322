//! Statistics tracker for resolution outcomes

use crate::types::{BlockReason, ErrorContext, Resolution, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum retained history entries (oldest evicted first)
pub const MAX_HISTORY: usize = 100;

/// Characters of the error message kept per history entry
const ERROR_PREVIEW_CHARS: usize = 160;

/// Characters of the solution kept per history entry
const SOLUTION_PREVIEW_CHARS: usize = 120;

/// One resolved failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub error_preview: String,
    pub tier: Tier,
    pub confidence: f64,
    pub auto_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockReason>,
}

/// Persisted counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub total_attempts: u64,
    pub tier1_hits: u64,
    pub tier2_hits: u64,
    pub tier2_auto_applied: u64,
    pub tier2_user_confirmed: u64,
    pub tier3_escalations: u64,
    /// Tier-2 HIGH suggestions refused by the breaker or safety filter
    pub blocked_auto_applies: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    pub resolution_history: VecDeque<HistoryEntry>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Statistics {
    /// Fraction of attempts resolved without a human (0.0 with no attempts)
    pub fn automation_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            (self.tier1_hits + self.tier2_auto_applied) as f64 / self.total_attempts as f64
        }
    }
}

/// Read-only view returned to callers, with derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_attempts: u64,
    pub tier1_hits: u64,
    pub tier2_hits: u64,
    pub tier2_auto_applied: u64,
    pub tier2_user_confirmed: u64,
    pub tier3_escalations: u64,
    pub blocked_auto_applies: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    pub automation_rate: f64,
    pub history: Vec<HistoryEntry>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<&Statistics> for StatisticsSnapshot {
    fn from(stats: &Statistics) -> Self {
        Self {
            total_attempts: stats.total_attempts,
            tier1_hits: stats.tier1_hits,
            tier2_hits: stats.tier2_hits,
            tier2_auto_applied: stats.tier2_auto_applied,
            tier2_user_confirmed: stats.tier2_user_confirmed,
            tier3_escalations: stats.tier3_escalations,
            blocked_auto_applies: stats.blocked_auto_applies,
            successful_recoveries: stats.successful_recoveries,
            failed_recoveries: stats.failed_recoveries,
            automation_rate: stats.automation_rate(),
            history: stats.resolution_history.iter().cloned().collect(),
            last_updated: stats.last_updated,
        }
    }
}

/// Statistics tracker for resolution outcomes
#[derive(Debug, Clone, Default)]
pub struct StatisticsTracker {
    stats: Statistics,
}

impl StatisticsTracker {
    /// Create new statistics tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously persisted statistics
    pub fn from_statistics(mut stats: Statistics) -> Self {
        while stats.resolution_history.len() > MAX_HISTORY {
            stats.resolution_history.pop_front();
        }
        Self { stats }
    }

    /// Count one `resolve_error` outcome
    pub fn record(&mut self, resolution: &Resolution, context: &ErrorContext) {
        self.stats.total_attempts += 1;

        match resolution.tier {
            Tier::Knowledge => self.stats.tier1_hits += 1,
            Tier::Documentation => {
                self.stats.tier2_hits += 1;
                if resolution.auto_applied {
                    self.stats.tier2_auto_applied += 1;
                } else {
                    self.stats.tier2_user_confirmed += 1;
                }
            }
            Tier::Human => {
                self.stats.tier3_escalations += 1;
                if resolution.blocked.is_some() {
                    self.stats.blocked_auto_applies += 1;
                }
            }
        }

        self.push_history(HistoryEntry {
            timestamp: context.timestamp,
            tool: context.tool.clone(),
            error_preview: context.preview(ERROR_PREVIEW_CHARS),
            tier: resolution.tier,
            confidence: resolution.confidence,
            auto_applied: resolution.auto_applied,
            solution_preview: resolution
                .solution
                .as_deref()
                .map(|s| s.chars().take(SOLUTION_PREVIEW_CHARS).collect()),
            blocked: resolution.blocked.as_ref().map(|b| b.reason.clone()),
        });
        self.touch();
    }

    /// Count the outcome of an apply-and-retry cycle
    pub fn record_recovery(&mut self, recovered: bool) {
        if recovered {
            self.stats.successful_recoveries += 1;
        } else {
            self.stats.failed_recoveries += 1;
        }
        self.touch();
    }

    /// Zero every counter and clear the history
    pub fn reset(&mut self) {
        self.stats = Statistics::default();
        self.touch();
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot::from(&self.stats)
    }

    pub fn automation_rate(&self) -> f64 {
        self.stats.automation_rate()
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.stats.resolution_history
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        self.stats.resolution_history.push_back(entry);
        while self.stats.resolution_history.len() > MAX_HISTORY {
            self.stats.resolution_history.pop_front();
        }
    }

    fn touch(&mut self) {
        self.stats.last_updated = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockedSuggestion, SearchResult, SearchStage};
    use quickcheck_macros::quickcheck;

    fn context(message: &str) -> ErrorContext {
        ErrorContext::new("Bash", message)
    }

    fn tier1() -> Resolution {
        let result = SearchResult::hit(
            SearchStage::Filename,
            "pip install pandas".to_string(),
            "kb/module-not-found--pandas--1.md".to_string(),
            0.95,
            2,
            100,
        );
        Resolution::knowledge(&result, true)
    }

    fn tier2(auto_applied: bool) -> Resolution {
        Resolution::documentation(
            "chmod +x run.sh".to_string(),
            0.95,
            "pattern:permission-denied".to_string(),
            5,
            5100,
            auto_applied,
        )
    }

    #[test]
    fn test_tracker_creation() {
        let tracker = StatisticsTracker::new();
        assert_eq!(tracker.statistics().total_attempts, 0);
        assert_eq!(tracker.automation_rate(), 0.0);
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn test_tier_counters() {
        let mut tracker = StatisticsTracker::new();

        tracker.record(&tier1(), &context("a"));
        tracker.record(&tier2(true), &context("b"));
        tracker.record(&tier2(false), &context("c"));
        tracker.record(&Resolution::escalation(1, 7600), &context("d"));

        let stats = tracker.statistics();
        assert_eq!(stats.total_attempts, 4);
        assert_eq!(stats.tier1_hits, 1);
        assert_eq!(stats.tier2_hits, 2);
        assert_eq!(stats.tier2_auto_applied, 1);
        assert_eq!(stats.tier2_user_confirmed, 1);
        assert_eq!(stats.tier3_escalations, 1);
        assert_eq!(
            stats.total_attempts,
            stats.tier1_hits + stats.tier2_hits + stats.tier3_escalations
        );
    }

    #[test]
    fn test_automation_rate() {
        let mut tracker = StatisticsTracker::new();

        tracker.record(&tier1(), &context("a"));
        tracker.record(&tier2(true), &context("b"));
        tracker.record(&tier2(false), &context("c"));
        tracker.record(&Resolution::escalation(1, 7600), &context("d"));

        assert_eq!(tracker.automation_rate(), 0.5);
        assert_eq!(tracker.snapshot().automation_rate, 0.5);
    }

    #[test]
    fn test_blocked_escalation_counted() {
        let mut tracker = StatisticsTracker::new();
        let resolution = Resolution::escalation(1, 7600).with_blocked(BlockedSuggestion {
            solution: "chmod +x run.sh".to_string(),
            confidence: 0.95,
            reason: BlockReason::CircuitOpen,
        });

        tracker.record(&resolution, &context("blocked"));

        let stats = tracker.statistics();
        assert_eq!(stats.tier3_escalations, 1);
        assert_eq!(stats.blocked_auto_applies, 1);
        assert_eq!(tracker.history()[0].blocked, Some(BlockReason::CircuitOpen));
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut tracker = StatisticsTracker::new();

        for i in 0..(MAX_HISTORY + 5) {
            tracker.record(&tier1(), &context(&format!("error {}", i)));
        }

        assert_eq!(tracker.history().len(), MAX_HISTORY);
        assert_eq!(tracker.history()[0].error_preview, "error 5");
        assert_eq!(tracker.statistics().total_attempts, (MAX_HISTORY + 5) as u64);
    }

    #[test]
    fn test_recovery_counters() {
        let mut tracker = StatisticsTracker::new();
        tracker.record_recovery(true);
        tracker.record_recovery(false);
        tracker.record_recovery(true);

        assert_eq!(tracker.statistics().successful_recoveries, 2);
        assert_eq!(tracker.statistics().failed_recoveries, 1);
    }

    #[test]
    fn test_reset() {
        let mut tracker = StatisticsTracker::new();
        tracker.record(&tier1(), &context("a"));
        tracker.reset();

        assert_eq!(tracker.statistics().total_attempts, 0);
        assert!(tracker.history().is_empty());
        assert_eq!(tracker.automation_rate(), 0.0);
    }

    #[test]
    fn test_from_statistics_trims_history() {
        let mut tracker = StatisticsTracker::new();
        for i in 0..MAX_HISTORY {
            tracker.record(&tier1(), &context(&format!("error {}", i)));
        }
        let mut stats = tracker.statistics().clone();
        stats.resolution_history.push_back(stats.resolution_history[0].clone());

        let resumed = StatisticsTracker::from_statistics(stats);
        assert_eq!(resumed.history().len(), MAX_HISTORY);
    }

    #[quickcheck]
    fn prop_history_bounded(count: u8) -> bool {
        let mut tracker = StatisticsTracker::new();
        for _ in 0..count {
            tracker.record(&Resolution::escalation(0, 0), &context("x"));
        }
        tracker.history().len() == (count as usize).min(MAX_HISTORY)
            && tracker.statistics().total_attempts == count as u64
    }
}
