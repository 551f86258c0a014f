use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use rolegate_core::cache::CacheConfig;
use rolegate_core::engine::EngineConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub cache: CacheSection,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_hierarchy_depth: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    /// Zero keeps entries until invalidated.
    pub ttl_secs: u64,
    pub max_entries_per_user: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            max_hierarchy_depth: defaults.max_hierarchy_depth,
            timeout_ms: u64::try_from(defaults.default_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries_per_user: 1024,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/rolegate".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ROLEGATE_ENGINE_MAX_HIERARCHY_DEPTH")
            && let Ok(n) = v.parse()
        {
            self.engine.max_hierarchy_depth = n;
        }
        if let Ok(v) = std::env::var("ROLEGATE_ENGINE_TIMEOUT_MS")
            && let Ok(n) = v.parse()
        {
            self.engine.timeout_ms = n;
        }
        if let Ok(v) = std::env::var("ROLEGATE_CACHE_ENABLED")
            && let Ok(enabled) = v.parse()
        {
            self.cache.enabled = enabled;
        }
        if let Ok(v) = std::env::var("ROLEGATE_CACHE_TTL_SECS")
            && let Ok(n) = v.parse()
        {
            self.cache.ttl_secs = n;
        }
        if let Ok(v) = std::env::var("ROLEGATE_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("ROLEGATE_DATABASE_MAX_CONNECTIONS")
            && let Ok(n) = v.parse()
        {
            self.database.max_connections = n;
        }
        if let Ok(v) = std::env::var("ROLEGATE_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("ROLEGATE_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_hierarchy_depth == 0 {
            return Err(ConfigError::Validation(
                "engine.max_hierarchy_depth must be non-zero".to_string(),
            ));
        }
        if self.engine.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_hierarchy_depth: self.engine.max_hierarchy_depth,
            default_timeout: Duration::from_millis(self.engine.timeout_ms),
        }
    }

    /// A disabled cache keeps the same type but never stores a decision.
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: (self.cache.ttl_secs > 0).then(|| Duration::from_secs(self.cache.ttl_secs)),
            max_entries_per_user: if self.cache.enabled {
                self.cache.max_entries_per_user
            } else {
                0
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}
