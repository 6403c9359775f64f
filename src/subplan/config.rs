//! Subplanner configuration
//!
//! Loaded from a JSON file. Every field is optional; missing fields take
//! their defaults. Values are validated on load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read(_) => "CONFIG_READ",
            ConfigError::Parse(_) => "CONFIG_PARSE",
            ConfigError::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

/// Trial and caching knobs for subplanning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubplanConfig {
    /// Minimum per-candidate work budget
    #[serde(default = "default_max_works_floor")]
    pub max_works_floor: u64,

    /// Budget grows to this fraction of the record count when larger
    #[serde(default = "default_works_collection_fraction")]
    pub works_collection_fraction: f64,

    /// A trial round ends once a candidate produces this many results
    #[serde(default = "default_max_results")]
    pub max_results: u64,

    /// Periodic yield after this many work units
    #[serde(default = "default_yield_every_works")]
    pub yield_every_works: u64,

    /// Periodic yield after this many milliseconds
    #[serde(default = "default_yield_period_ms")]
    pub yield_period_ms: u64,

    /// Write the pinned cache entry when assembling the executor
    #[serde(default = "default_cache_pinned_entries")]
    pub cache_pinned_entries: bool,

    #[serde(default)]
    pub plan_cache: PlanCacheConfig,
}

fn default_max_works_floor() -> u64 {
    10_000
}
fn default_works_collection_fraction() -> f64 {
    0.29
}
fn default_max_results() -> u64 {
    101
}
fn default_yield_every_works() -> u64 {
    1_000
}
fn default_yield_period_ms() -> u64 {
    10
}
fn default_cache_pinned_entries() -> bool {
    true
}

impl Default for SubplanConfig {
    fn default() -> Self {
        Self {
            max_works_floor: default_max_works_floor(),
            works_collection_fraction: default_works_collection_fraction(),
            max_results: default_max_results(),
            yield_every_works: default_yield_every_works(),
            yield_period_ms: default_yield_period_ms(),
            cache_pinned_entries: default_cache_pinned_entries(),
            plan_cache: PlanCacheConfig::default(),
        }
    }
}

impl SubplanConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: SubplanConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_works_floor == 0 {
            return Err(ConfigError::Invalid("max_works_floor must be > 0".into()));
        }
        if !(self.works_collection_fraction > 0.0 && self.works_collection_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "works_collection_fraction must be in (0, 1], got {}",
                self.works_collection_fraction
            )));
        }
        if self.max_results == 0 {
            return Err(ConfigError::Invalid("max_results must be > 0".into()));
        }
        if self.yield_every_works == 0 {
            return Err(ConfigError::Invalid("yield_every_works must be > 0".into()));
        }
        self.plan_cache.validate()
    }
}

/// Sizing and promotion policy for the in-memory plan cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCacheConfig {
    /// Maximum number of entries
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Writes an unpinned entry needs before lookups see it
    #[serde(default = "default_promotion_votes")]
    pub promotion_votes: u32,
}

fn default_capacity() -> usize {
    5_000
}
fn default_promotion_votes() -> u32 {
    2
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            promotion_votes: default_promotion_votes(),
        }
    }
}

impl PlanCacheConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("plan_cache.capacity must be > 0".into()));
        }
        if self.promotion_votes == 0 {
            return Err(ConfigError::Invalid(
                "plan_cache.promotion_votes must be > 0".into(),
            ));
        }
        Ok(())
    }
}
