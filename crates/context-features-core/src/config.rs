//! Configuration management for context-features.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoreError, CoreResult};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub online: OnlineConfig,
    #[serde(default)]
    pub offline: OfflineConfig,
    #[serde(default)]
    pub lineage_store: LineageStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order:
    /// 1. config/default.toml (base settings)
    /// 2. config/{CONTEXT_FEATURES_ENV}.toml (environment-specific)
    /// 3. Environment variables with CONTEXT_FEATURES__ prefix
    pub fn load() -> CoreResult<Self> {
        let env =
            std::env::var("CONTEXT_FEATURES_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("CONTEXT_FEATURES").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> CoreResult<()> {
        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            return Err(CoreError::Config(format!(
                "logging.format must be 'pretty', 'compact', or 'json', got '{}'",
                self.logging.format
            )));
        }

        if self.online.max_concurrent_lookups == 0 {
            return Err(CoreError::Config(
                "online.max_concurrent_lookups must be greater than 0".into(),
            ));
        }

        if self.offline.database.trim().is_empty() {
            return Err(CoreError::Config(
                "offline.database must not be empty (use ':memory:' for in-process)".into(),
            ));
        }

        if self.retrieval.default_top_k == 0 {
            return Err(CoreError::Config(
                "retrieval.default_top_k must be greater than 0".into(),
            ));
        }

        if self.pricing.cost_per_1k_tokens < 0.0 || !self.pricing.cost_per_1k_tokens.is_finite() {
            return Err(CoreError::Config(
                "pricing.cost_per_1k_tokens must be a finite, non-negative number".into(),
            ));
        }

        match self.lineage_store.backend.as_str() {
            "memory" => {}
            "rocksdb" => {
                let path = PathBuf::from(&self.lineage_store.path);
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        return Err(CoreError::Config(format!(
                            "lineage_store.path parent directory does not exist: {}",
                            parent.display()
                        )));
                    }
                }
            }
            other => {
                return Err(CoreError::Config(format!(
                    "lineage_store.backend must be 'memory' or 'rocksdb', got '{}'",
                    other
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            include_location: false,
        }
    }
}

/// Online resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OnlineConfig {
    /// Global freshness SLA applied to features without their own.
    /// `None` disables SLA checks for those features.
    pub default_freshness_sla_ms: Option<u64>,
    /// Upper bound on feature lookups in flight for one resolve call.
    pub max_concurrent_lookups: usize,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            default_freshness_sla_ms: None,
            max_concurrent_lookups: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OfflineConfig {
    /// SQLite database path, or `:memory:`.
    pub database: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LineageStoreConfig {
    pub backend: String,
    pub path: String,
    pub block_cache_size: usize,
    pub max_open_files: i32,
    pub enable_wal: bool,
}

impl Default for LineageStoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "./data/context_log".to_string(),
            block_cache_size: 64 * 1024 * 1024,
            max_open_files: 1000,
            enable_wal: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Chunks older than this at retrieval time are flagged stale.
    pub chunk_freshness_sla_ms: Option<u64>,
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_freshness_sla_ms: None,
            default_top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
    pub cost_per_1k_tokens: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cost_per_1k_tokens: 0.0,
        }
    }
}

impl PricingConfig {
    /// Estimated cost in USD for `tokens` tokens.
    pub fn estimate_cost(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k_tokens
    }
}
