// Strata Configuration
//
// Defines configuration for the decay engine, relationship graph, hybrid
// scorer and maintenance scheduler. Every table carries serde defaults, so a
// partial TOML file deep-merges over the defaults, nested weights included.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub decay: DecayConfig,
    pub graph: GraphConfig,
    pub scoring: ScoringConfig,
    pub maintenance: MaintenanceConfig,
}

/// Decay engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Age at which the age factor reaches exactly 0.5
    pub half_life_days: f64,
    /// Accesses per month that saturate the access factor
    pub expected_accesses_per_month: f64,
    /// Window after an access during which the recency boost applies
    pub recency_boost_days: f64,
    /// Boost applied to an access made right now; fades to 1.0 at the window edge
    pub recency_boost_multiplier: f64,
    /// Chunks scoring below this are archived by `update_all(auto_archive)`
    pub archival_threshold: f64,
    pub weights: DecayWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayWeights {
    pub age: f64,
    pub access: f64,
    pub importance: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            expected_accesses_per_month: 10.0,
            recency_boost_days: 7.0,
            recency_boost_multiplier: 1.5,
            archival_threshold: 0.2,
            weights: DecayWeights::default(),
        }
    }
}

impl Default for DecayWeights {
    fn default() -> Self {
        Self {
            age: 0.3,
            access: 0.3,
            importance: 0.4,
        }
    }
}

/// Relationship graph settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Hard ceiling applied to every traversal, whatever the caller asks for
    pub max_depth_ceiling: usize,
    /// Depth of `RelationshipGraph::traversal_options`
    pub default_traversal_depth: usize,
    pub transitive_depth: usize,
    /// Number of connected chunks sampled for the approximate max depth
    pub stats_depth_samples: usize,
    pub top_connected: usize,
    pub supersedes_strength: f64,
    pub contradiction_strength: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth_ceiling: 10,
            default_traversal_depth: 3,
            transitive_depth: 2,
            stats_depth_samples: 5,
            top_connected: 10,
            supersedes_strength: 1.0,
            contradiction_strength: 0.8,
        }
    }
}

/// Hybrid scorer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub recency_half_life_days: f64,
    pub graph_depth: usize,
    pub graph_min_strength: f64,
    /// Added to the type multiplier when the chunk type is preferred
    pub preferred_type_bonus: f64,
    /// Per chunk type multiplier keyed by type name; missing types are 1.0
    pub type_multipliers: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub decay: f64,
    pub importance: f64,
    pub recency: f64,
    pub graph_boost: f64,
    pub type_boost: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            recency_half_life_days: 14.0,
            graph_depth: 2,
            graph_min_strength: 0.3,
            preferred_type_bonus: 0.1,
            type_multipliers: BTreeMap::new(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.35,
            decay: 0.20,
            importance: 0.15,
            recency: 0.10,
            graph_boost: 0.10,
            type_boost: 0.10,
        }
    }
}

/// Maintenance scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Period of the decay refresh timer (in seconds)
    #[serde(with = "serde_duration")]
    pub decay_interval: Duration,
    /// UTC hour of the nightly consolidation
    pub daily_hour: u32,
    /// Day of the weekly summarization, days from Sunday (0 = Sunday)
    pub weekly_weekday: u32,
    pub weekly_hour: u32,
    /// Day of month of the monthly reindex (1-28)
    pub monthly_day: u32,
    pub monthly_hour: u32,
    /// Chunks created within this window are treated as duplicates (in seconds)
    #[serde(with = "serde_duration")]
    pub duplicate_window: Duration,
    pub consolidation_archive_threshold: f64,
    pub importance_boost: f64,
    /// Accesses inside this window earn the importance boost (in seconds)
    #[serde(with = "serde_duration")]
    pub recent_access_window: Duration,
    /// Never-accessed chunks older than this are archived by reindex
    pub stale_age_days: f64,
    pub history_capacity: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            decay_interval: Duration::from_secs(3600), // 1 hour
            daily_hour: 2,
            weekly_weekday: 0,
            weekly_hour: 3,
            monthly_day: 1,
            monthly_hour: 4,
            duplicate_window: Duration::from_secs(60),
            consolidation_archive_threshold: 0.15,
            importance_boost: 0.05,
            recent_access_window: Duration::from_secs(86400), // 24 hours
            stale_age_days: 180.0,
            history_capacity: 100,
        }
    }
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl StrataConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: StrataConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// Rejects values that cannot produce a score at all (negative or
    /// non-finite weights, thresholds outside [0, 1], impossible clock
    /// times). Weights are not normalized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decay;
        positive("decay.half_life_days", d.half_life_days)?;
        positive("decay.expected_accesses_per_month", d.expected_accesses_per_month)?;
        positive("decay.recency_boost_days", d.recency_boost_days)?;
        if !d.recency_boost_multiplier.is_finite() || d.recency_boost_multiplier < 1.0 {
            return Err(invalid("decay.recency_boost_multiplier must be at least 1.0"));
        }
        unit_interval("decay.archival_threshold", d.archival_threshold)?;
        weight("decay.weights.age", d.weights.age)?;
        weight("decay.weights.access", d.weights.access)?;
        weight("decay.weights.importance", d.weights.importance)?;

        let g = &self.graph;
        if g.max_depth_ceiling == 0 {
            return Err(invalid("graph.max_depth_ceiling must be at least 1"));
        }
        unit_interval("graph.supersedes_strength", g.supersedes_strength)?;
        unit_interval("graph.contradiction_strength", g.contradiction_strength)?;

        let s = &self.scoring;
        weight("scoring.weights.similarity", s.weights.similarity)?;
        weight("scoring.weights.decay", s.weights.decay)?;
        weight("scoring.weights.importance", s.weights.importance)?;
        weight("scoring.weights.recency", s.weights.recency)?;
        weight("scoring.weights.graph_boost", s.weights.graph_boost)?;
        weight("scoring.weights.type_boost", s.weights.type_boost)?;
        positive("scoring.recency_half_life_days", s.recency_half_life_days)?;
        unit_interval("scoring.graph_min_strength", s.graph_min_strength)?;
        weight("scoring.preferred_type_bonus", s.preferred_type_bonus)?;
        for (name, multiplier) in &s.type_multipliers {
            if name.parse::<crate::types::ChunkType>().is_err() {
                return Err(invalid(&format!(
                    "scoring.type_multipliers: unknown chunk type '{}'",
                    name
                )));
            }
            weight("scoring.type_multipliers", *multiplier)?;
        }

        let m = &self.maintenance;
        if m.decay_interval < Duration::from_secs(60) {
            return Err(invalid("maintenance.decay_interval must be at least 1 minute"));
        }
        for (name, hour) in [
            ("maintenance.daily_hour", m.daily_hour),
            ("maintenance.weekly_hour", m.weekly_hour),
            ("maintenance.monthly_hour", m.monthly_hour),
        ] {
            if hour > 23 {
                return Err(invalid(&format!("{} must be between 0 and 23", name)));
            }
        }
        if m.weekly_weekday > 6 {
            return Err(invalid("maintenance.weekly_weekday must be between 0 and 6"));
        }
        if !(1..=28).contains(&m.monthly_day) {
            return Err(invalid("maintenance.monthly_day must be between 1 and 28"));
        }
        unit_interval(
            "maintenance.consolidation_archive_threshold",
            m.consolidation_archive_threshold,
        )?;
        unit_interval("maintenance.importance_boost", m.importance_boost)?;
        positive("maintenance.stale_age_days", m.stale_age_days)?;
        if m.history_capacity == 0 {
            return Err(invalid("maintenance.history_capacity must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

fn weight(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(&format!("{} must be a non-negative number", name)));
    }
    Ok(())
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(&format!("{} must be greater than zero", name)));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(&format!("{} must be between 0 and 1", name)));
    }
    Ok(())
}
