use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid batch_size: {0}. Must be at least 1")]
    InvalidBatchSize(usize),

    #[error("Invalid debounce_seconds: {0}. Must be at least 1")]
    InvalidDebounce(u64),

    #[error("debounce_seconds ({0}) must not exceed buffer max_wait_seconds ({1})")]
    DebounceExceedsMaxWait(u64, u64),

    #[error("Invalid approve_threshold: {0}. Must be in (0, 10]")]
    InvalidApproveThreshold(f64),

    #[error("Invalid stabilization_scale: {0}. Must be positive")]
    InvalidStabilizationScale(f64),

    #[error("Invalid pipeline_bonus: {0}. Must be finite")]
    InvalidPipelineBonus(f64),

    #[error("Invalid weight {weight} for scoring category '{name}'. Must be finite and non-negative")]
    InvalidCategoryWeight { name: String, weight: f64 },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_concurrent_proposals: {0}. Must be at least 1")]
    InvalidMaxConcurrentProposals(usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .changeward/config.yaml (project config)
    /// 3. .changeward/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CHANGEWARD_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(".changeward/config.yaml")
            .merge(Yaml::file(".changeward/local.yaml"))
            .merge(Env::prefixed("CHANGEWARD_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Self::figment(path.as_ref())
            .merge(Env::prefixed("CHANGEWARD_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(path: impl AsRef<std::path::Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let buffer = &config.buffer;
        if buffer.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(buffer.batch_size));
        }
        if buffer.debounce_seconds == 0 {
            return Err(ConfigError::InvalidDebounce(buffer.debounce_seconds));
        }
        if buffer.debounce_seconds > buffer.max_wait_seconds {
            return Err(ConfigError::DebounceExceedsMaxWait(
                buffer.debounce_seconds,
                buffer.max_wait_seconds,
            ));
        }

        let scoring = &config.scoring;
        if !scoring.approve_threshold.is_finite()
            || scoring.approve_threshold <= 0.0
            || scoring.approve_threshold > 10.0
        {
            return Err(ConfigError::InvalidApproveThreshold(scoring.approve_threshold));
        }
        if !scoring.stabilization_scale.is_finite() || scoring.stabilization_scale <= 0.0 {
            return Err(ConfigError::InvalidStabilizationScale(scoring.stabilization_scale));
        }
        if !scoring.pipeline_bonus.is_finite() {
            return Err(ConfigError::InvalidPipelineBonus(scoring.pipeline_bonus));
        }
        for category in &scoring.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "scoring category name cannot be empty".to_string(),
                ));
            }
            if !category.weight.is_finite() || category.weight < 0.0 {
                return Err(ConfigError::InvalidCategoryWeight {
                    name: category.name.clone(),
                    weight: category.weight,
                });
            }
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.workers.max_concurrent_proposals == 0 {
            return Err(ConfigError::InvalidMaxConcurrentProposals(
                config.workers.max_concurrent_proposals,
            ));
        }

        if config.vcs.branch_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "vcs.branch_prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
