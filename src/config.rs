//! Configuration management for cascadefix
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.cascadefix/config.toml

use crate::errors::{ResolverError, Result};
use crate::resolver::ResolverConfig;
use crate::search::{SearchSettings, StageBudget};
use crate::tools::WrapperConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the home directory holding config and data
pub const APP_DIR: &str = ".cascadefix";

/// Complete configuration for cascadefix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub knowledge: KnowledgeConfig,
    pub statistics: StatisticsConfig,
    pub telemetry: TelemetryConfig,
    pub breaker: BreakerConfig,
    pub search: SearchConfig,
    pub docs: DocsConfig,
    pub apply: ApplyConfig,
    pub safety: SafetyConfig,
}

/// Knowledge store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub root: String,
}

/// Statistics file location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub path: String,
}

/// Search telemetry file location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub path: String,
}

/// Circuit breaker tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

/// Progressive search budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub stage1_target_ms: u64,
    pub stage1_limit_ms: u64,
    pub stage2_target_ms: u64,
    pub stage2_limit_ms: u64,
    pub stage3_target_ms: u64,
    pub stage3_limit_ms: u64,
    pub tier1_min_confidence: f64,
}

/// Documentation source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub timeout_ms: u64,
}

/// Fix execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
}

/// Safety filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Check Tier-1 solutions against the blacklist too
    pub strict_tier1: bool,
    pub extra_patterns: Vec<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root: "~/.cascadefix/knowledge".to_string(),
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            path: "~/.cascadefix/statistics.json".to_string(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            path: "~/.cascadefix/search_telemetry.json".to_string(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        let settings = SearchSettings::default();
        Self {
            stage1_target_ms: settings.filename.target_ms,
            stage1_limit_ms: settings.filename.limit_ms,
            stage2_target_ms: settings.metadata.target_ms,
            stage2_limit_ms: settings.metadata.limit_ms,
            stage3_target_ms: settings.full_text.target_ms,
            stage3_limit_ms: settings.full_text.limit_ms,
            tier1_min_confidence: 0.8,
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            strict_tier1: true,
            extra_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ResolverError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ResolverError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `~/.cascadefix/config.toml`, writing defaults there when missing
    pub fn load_default() -> Result<Self> {
        let Some(config_path) = Self::default_path() else {
            return Ok(Config::default());
        };

        if config_path.exists() {
            return Self::load_from_file(&config_path);
        }

        let config = Config::default();
        config.save(&config_path)?;
        Ok(config)
    }

    /// `~/.cascadefix/config.toml`, if a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(APP_DIR).join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.breaker.failure_threshold == 0 {
            return Err(ResolverError::ConfigError(
                "failure_threshold must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.search.tier1_min_confidence) {
            return Err(ResolverError::ConfigError(
                "tier1_min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }

        let stages = [
            ("stage1", self.search.stage1_target_ms, self.search.stage1_limit_ms),
            ("stage2", self.search.stage2_target_ms, self.search.stage2_limit_ms),
            ("stage3", self.search.stage3_target_ms, self.search.stage3_limit_ms),
        ];
        for (name, target, limit) in stages {
            if limit == 0 {
                return Err(ResolverError::ConfigError(format!(
                    "{}_limit_ms must be greater than 0",
                    name
                )));
            }
            if target > limit {
                return Err(ResolverError::ConfigError(format!(
                    "{}_target_ms must not exceed {}_limit_ms",
                    name, name
                )));
            }
        }

        if self.docs.timeout_ms == 0 {
            return Err(ResolverError::ConfigError(
                "docs timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.apply.timeout_secs == 0 {
            return Err(ResolverError::ConfigError(
                "apply timeout_secs must be greater than 0".to_string(),
            ));
        }

        for pattern in &self.safety.extra_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                ResolverError::ConfigError(format!("Invalid safety pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ResolverError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ResolverError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| ResolverError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn knowledge_root(&self) -> PathBuf {
        Self::expand_path(&self.knowledge.root)
    }

    pub fn statistics_path(&self) -> PathBuf {
        Self::expand_path(&self.statistics.path)
    }

    pub fn telemetry_path(&self) -> PathBuf {
        Self::expand_path(&self.telemetry.path)
    }

    /// Runtime settings for the resolver
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            tier1_min_confidence: self.search.tier1_min_confidence,
            strict_tier1_safety: self.safety.strict_tier1,
            doc_timeout: Duration::from_millis(self.docs.timeout_ms),
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Duration::from_secs(self.breaker.cooldown_secs),
            search: SearchSettings {
                filename: StageBudget::new(self.search.stage1_target_ms, self.search.stage1_limit_ms),
                metadata: StageBudget::new(self.search.stage2_target_ms, self.search.stage2_limit_ms),
                full_text: StageBudget::new(self.search.stage3_target_ms, self.search.stage3_limit_ms),
                ..SearchSettings::default()
            },
            extra_safety_patterns: self.safety.extra_patterns.clone(),
            statistics_path: Some(self.statistics_path()),
            telemetry_path: Some(self.telemetry_path()),
        }
    }

    /// Runtime settings for the tool wrapper
    pub fn wrapper_config(&self) -> WrapperConfig {
        WrapperConfig {
            apply_enabled: self.apply.enabled,
            apply_timeout: Duration::from_secs(self.apply.timeout_secs),
        }
    }
}
