//! Resolution statistics
//!
//! Flat persisted counters describing how failures were resolved, plus a
//! bounded history of recent resolutions.

pub mod persistence;
pub mod tracker;

pub use persistence::StatisticsPersistence;
pub use tracker::{HistoryEntry, Statistics, StatisticsSnapshot, StatisticsTracker, MAX_HISTORY};
