//! Configuration loading for the pull request syncer.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SYNCER_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::github::{RepositoryId, RepositoryIdError};

const ENV_PREFIX: &str = "SYNCER_";

/// Application configuration derived from `SYNCER_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    /// Ordered credential pool; rotation walks it front to back.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub github_tokens: Vec<String>,
    #[serde(default)]
    pub github_repositories: Vec<RepositoryId>,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Tuning knobs for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Seconds between the start of consecutive sweeps (default: 600)
    ///
    /// Environment variable: `SYNCER_SYNC_INTERVAL_SECONDS`
    #[serde(default = "default_sync_interval_seconds")]
    pub interval_seconds: u64,

    /// Maximum age in days of activity considered by a first backfill (default: 180)
    ///
    /// Environment variable: `SYNCER_SYNC_LOOKBACK_DAYS`
    #[serde(default = "default_sync_lookback_days")]
    pub lookback_days: u32,

    /// Pull requests enriched in parallel within one batch (default: 3)
    ///
    /// Environment variable: `SYNCER_SYNC_ENRICHMENT_CONCURRENCY`
    #[serde(default = "default_sync_enrichment_concurrency")]
    pub enrichment_concurrency: usize,

    /// `per_page` sent on every list request (default: 100, upstream maximum)
    ///
    /// Environment variable: `SYNCER_SYNC_PAGE_SIZE`
    #[serde(default = "default_sync_page_size")]
    pub page_size: u32,

    /// Seconds added on top of the upstream reset time before retrying (default: 10)
    ///
    /// Environment variable: `SYNCER_SYNC_BACKOFF_BUFFER_SECONDS`
    #[serde(default = "default_sync_backoff_buffer_seconds")]
    pub backoff_buffer_seconds: u64,

    /// Attempts per call are capped at `pool size * retry_multiplier` (default: 3)
    ///
    /// Environment variable: `SYNCER_SYNC_RETRY_MULTIPLIER`
    #[serde(default = "default_sync_retry_multiplier")]
    pub retry_multiplier: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            github_api_base: default_github_api_base(),
            github_tokens: Vec::new(),
            github_repositories: Vec::new(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sync_interval_seconds(),
            lookback_days: default_sync_lookback_days(),
            enrichment_concurrency: default_sync_enrichment_concurrency(),
            page_size: default_sync_page_size(),
            backoff_buffer_seconds: default_sync_backoff_buffer_seconds(),
            retry_multiplier: default_sync_retry_multiplier(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.lookback_days))
    }

    pub fn backoff_buffer(&self) -> Duration {
        Duration::from_secs(self.backoff_buffer_seconds)
    }

    /// Validate sync configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_seconds < 10 {
            return Err(ConfigError::InvalidSyncInterval {
                value: self.interval_seconds,
            });
        }

        if self.lookback_days == 0 || self.lookback_days > 3650 {
            return Err(ConfigError::InvalidLookbackDays {
                value: self.lookback_days,
            });
        }

        if self.enrichment_concurrency == 0 || self.enrichment_concurrency > 32 {
            return Err(ConfigError::InvalidEnrichmentConcurrency {
                value: self.enrichment_concurrency,
            });
        }

        if self.page_size == 0 || self.page_size > 100 {
            return Err(ConfigError::InvalidPageSize {
                value: self.page_size,
            });
        }

        if self.retry_multiplier == 0 {
            return Err(ConfigError::InvalidRetryMultiplier {
                value: self.retry_multiplier,
            });
        }

        Ok(())
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.github_tokens.is_empty() {
            config.github_tokens = vec![format!("[REDACTED x{}]", self.github_tokens.len())];
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github_tokens.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::MissingGitHubTokens);
        }

        if self.github_repositories.is_empty() {
            return Err(ConfigError::MissingRepositories);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        self.sync.validate()
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://syncer.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_sync_interval_seconds() -> u64 {
    600 // 10 minutes
}

fn default_sync_lookback_days() -> u32 {
    180
}

fn default_sync_enrichment_concurrency() -> usize {
    3
}

fn default_sync_page_size() -> u32 {
    100
}

fn default_sync_backoff_buffer_seconds() -> u64 {
    10
}

fn default_sync_retry_multiplier() -> u32 {
    3
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("no GitHub tokens configured; set SYNCER_GITHUB_TOKENS")]
    MissingGitHubTokens,
    #[error("no repositories configured; set SYNCER_GITHUB_REPOSITORIES")]
    MissingRepositories,
    #[error("invalid repository '{value}': {source}")]
    InvalidRepository {
        value: String,
        source: RepositoryIdError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidNumber { key: String, value: String },
    #[error("database URL cannot be empty")]
    MissingDatabaseUrl,
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("sync interval must be at least 10 seconds, got {value}")]
    InvalidSyncInterval { value: u64 },
    #[error("lookback window must be between 1 and 3650 days, got {value}")]
    InvalidLookbackDays { value: u32 },
    #[error("enrichment concurrency must be between 1 and 32, got {value}")]
    InvalidEnrichmentConcurrency { value: usize },
    #[error("page size must be between 1 and 100, got {value}")]
    InvalidPageSize { value: u32 },
    #[error("retry multiplier must be at least 1, got {value}")]
    InvalidRetryMultiplier { value: u32 },
}

/// Loads configuration using layered `.env` files and `SYNCER_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = parse_number(&mut layered, "DB_MAX_CONNECTIONS")?
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = parse_number(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")?
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let github_api_base = layered
            .remove("GITHUB_API_BASE")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_github_api_base);

        let github_tokens = layered
            .remove("GITHUB_TOKENS")
            .map(|tokens| split_list(&tokens))
            .unwrap_or_default();

        let github_repositories = layered
            .remove("GITHUB_REPOSITORIES")
            .map(|repos| {
                split_list(&repos)
                    .into_iter()
                    .map(|value| {
                        value
                            .parse::<RepositoryId>()
                            .map_err(|source| ConfigError::InvalidRepository { value, source })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let sync = SyncConfig {
            interval_seconds: parse_number(&mut layered, "SYNC_INTERVAL_SECONDS")?
                .unwrap_or_else(default_sync_interval_seconds),
            lookback_days: parse_number(&mut layered, "SYNC_LOOKBACK_DAYS")?
                .unwrap_or_else(default_sync_lookback_days),
            enrichment_concurrency: parse_number(&mut layered, "SYNC_ENRICHMENT_CONCURRENCY")?
                .unwrap_or_else(default_sync_enrichment_concurrency),
            page_size: parse_number(&mut layered, "SYNC_PAGE_SIZE")?
                .unwrap_or_else(default_sync_page_size),
            backoff_buffer_seconds: parse_number(&mut layered, "SYNC_BACKOFF_BUFFER_SECONDS")?
                .unwrap_or_else(default_sync_backoff_buffer_seconds),
            retry_multiplier: parse_number(&mut layered, "SYNC_RETRY_MULTIPLIER")?
                .unwrap_or_else(default_sync_retry_multiplier),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            github_api_base,
            github_tokens,
            github_repositories,
            sync,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match layered.remove(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: format!("{ENV_PREFIX}{key}"),
                value: raw,
            }),
    }
}
