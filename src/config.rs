use crate::core::EngineOptions;
use crate::models::{HardFiltersConfig, MatchWeights, RatingConfig};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    /// Redis-backed candidate cache; the service runs without it when absent
    #[serde(default)]
    pub cache: Option<CacheSettings>,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub hard_filters: HardFiltersConfig,
    #[serde(default)]
    pub rating: RatingConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub redis_url: String,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    #[serde(default = "default_max_commit_retries")]
    pub max_commit_retries: u32,
    /// Deadline for candidate lookups without a caller deadline
    pub candidate_timeout_ms: Option<u64>,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_commit_retries: default_max_commit_retries(),
            candidate_timeout_ms: None,
        }
    }
}

impl MatchingSettings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            max_commit_retries: self.max_commit_retries,
            candidate_deadline: self.candidate_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn default_limit() -> u32 { 20 }
fn default_max_limit() -> u32 { 100 }
fn default_max_commit_retries() -> u32 { 3 }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: MatchWeights,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. Configuration file (config/default.toml)
    /// 2. Local overrides (config/local.toml)
    /// 3. Environment variables prefixed with MATCHMAKER__,
    ///    e.g. MATCHMAKER__SERVER__PORT -> server.port
    /// 4. DATABASE_URL and REDIS_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        let settings = substitute_env_vars(settings)?;

        settings.try_deserialize::<Settings>()?.validated()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize::<Settings>()?.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.rating
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        if self.matching.max_limit == 0 {
            return Err(ConfigError::Message(
                "matching.max_limit must be positive".to_string(),
            ));
        }
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("MATCHMAKER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Let the conventional DATABASE_URL / REDIS_URL variables win over files
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("cache.redis_url", redis_url)?;
    }

    builder.build()
}
