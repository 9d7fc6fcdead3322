//! Statistics persistence to a single JSON file

use crate::errors::Result;
use crate::statistics::Statistics;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default statistics file name under the data directory
pub const STATISTICS_FILE: &str = "statistics.json";

/// JSON file store for resolver statistics
#[derive(Debug, Clone)]
pub struct StatisticsPersistence {
    path: PathBuf,
}

impl StatisticsPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.cascadefix/statistics.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cascadefix")
            .join(STATISTICS_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load statistics, falling back to zeroed counters when the file is
    /// missing or unreadable
    pub fn load(&self) -> Statistics {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No statistics file at {}, starting fresh", self.path.display());
                return Statistics::default();
            }
            Err(e) => {
                warn!("Failed to read statistics {}: {}", self.path.display(), e);
                return Statistics::default();
            }
        };

        serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(
                "Discarding corrupt statistics file {}: {}",
                self.path.display(),
                e
            );
            Statistics::default()
        })
    }

    /// Write statistics atomically (temp file in the same directory, then rename)
    pub fn save(&self, stats: &Statistics) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| STATISTICS_FILE.to_string());
        let temp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let json = serde_json::to_string_pretty(stats)?;
        if let Err(e) = fs::write(&temp, json).and_then(|_| fs::rename(&temp, &self.path)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_zeroed() {
        let dir = TempDir::new().unwrap();
        let persistence = StatisticsPersistence::new(dir.path().join("stats.json"));
        assert_eq!(persistence.load(), Statistics::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let persistence = StatisticsPersistence::new(dir.path().join("nested/stats.json"));

        let stats = Statistics {
            total_attempts: 7,
            tier1_hits: 3,
            tier3_escalations: 4,
            ..Default::default()
        };
        persistence.save(&stats).unwrap();

        let loaded = persistence.load();
        assert_eq!(loaded.total_attempts, 7);
        assert_eq!(loaded.tier1_hits, 3);
        assert_eq!(loaded.tier3_escalations, 4);
    }

    #[test]
    fn test_corrupt_file_loads_zeroed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        fs::write(&path, "{ not json").unwrap();

        let persistence = StatisticsPersistence::new(&path);
        assert_eq!(persistence.load(), Statistics::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        fs::write(&path, r#"{"total_attempts": 2, "tier1_hits": 2}"#).unwrap();

        let loaded = StatisticsPersistence::new(&path).load();
        assert_eq!(loaded.total_attempts, 2);
        assert_eq!(loaded.tier2_hits, 0);
        assert!(loaded.resolution_history.is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let persistence = StatisticsPersistence::new(dir.path().join("stats.json"));

        persistence.save(&Statistics::default()).unwrap();
        persistence.save(&Statistics::default()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
