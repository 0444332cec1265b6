use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RudderConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub ranking: RankingConfig,
    pub routing: RoutingConfig,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RankingConfig {
    /// Half-life of the recency decay, in seconds.
    pub half_life_secs: u64,
    /// Number of ranked-query results kept in the LRU cache.
    pub cache_capacity: usize,
    /// Maximum candidates scored per cache-miss ranking pass. Keeps ranking
    /// latency independent of historical volume.
    pub scan_cap: usize,
    /// Default result limit when the caller does not specify one.
    pub default_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoutingConfig {
    /// Lower bound of the repository-confidence threshold.
    pub confidence_floor: f64,
    /// Upper bound of the repository-confidence threshold.
    pub confidence_ceiling: f64,
    /// Complexity divisor in the threshold formula.
    pub complexity_divisor: f64,
    /// Number of top-ranked insights aggregated into a recommendation.
    pub top_k: usize,
    /// Sample count at which tracker confidence stops being discounted.
    pub sample_floor: u32,
    /// Caller-imposed deadline around each external model call, in seconds.
    pub process_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Longest permitted run of identical consecutive response lines.
    pub max_duplicate_run: usize,
}

impl Default for RudderConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            ranking: RankingConfig::default(),
            routing: RoutingConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_rudder_dir()
            .join("insights.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            half_life_secs: 7 * 24 * 3600,
            cache_capacity: 256,
            scan_cap: 512,
            default_limit: 5,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.6,
            confidence_ceiling: 0.8,
            complexity_divisor: 40.0,
            top_k: 5,
            sample_floor: 5,
            process_timeout_secs: 30,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_duplicate_run: 2,
        }
    }
}

/// Returns `~/.rudder/`
pub fn default_rudder_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".rudder")
}

/// Returns the default config file path: `~/.rudder/config.toml`
pub fn default_config_path() -> PathBuf {
    default_rudder_dir().join("config.toml")
}

impl RudderConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RudderConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (RUDDER_DB, RUDDER_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RUDDER_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RUDDER_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
