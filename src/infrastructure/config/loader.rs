//! Configuration loader with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::CoreConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid tick rate: {0}. Must be in (0, 50]")]
    InvalidTickRate(f64),

    #[error("Invalid aging thresholds: inferred_after ({0}) must be less than lost_after ({1})")]
    InvalidAging(u64, u64),

    #[error("Invalid saliency cap: {0}. Must be at least 1")]
    InvalidSaliencyCap(usize),

    #[error("Invalid snapshot interval: {0}. Must be at least 1")]
    InvalidSnapshotInterval(u64),

    #[error("Invalid planner bound: {0}")]
    InvalidPlannerBound(String),

    #[error("Invalid loop breaker threshold: {0}. Must be at least 1")]
    InvalidLoopThreshold(u64),

    #[error("Invalid history limit: {0}. Must be in [1, 50]")]
    InvalidHistoryLimit(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .cortex/config.yaml (project config)
    /// 3. .cortex/local.yaml (project local overrides, optional)
    /// 4. Environment variables (`CORTEX_*` prefix, highest priority)
    pub fn load() -> Result<CoreConfig> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(".cortex/config.yaml"))
            .merge(Yaml::file(".cortex/local.yaml"))
            .merge(Env::prefixed("CORTEX_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CoreConfig> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &CoreConfig) -> Result<(), ConfigError> {
        if config.tick_rate_hz <= 0.0 || config.tick_rate_hz > 50.0 {
            return Err(ConfigError::InvalidTickRate(config.tick_rate_hz));
        }

        if config.belief.aging_inferred_after >= config.belief.aging_lost_after {
            return Err(ConfigError::InvalidAging(
                config.belief.aging_inferred_after,
                config.belief.aging_lost_after,
            ));
        }
        if config.belief.max_saliency_events_per_emission == 0 {
            return Err(ConfigError::InvalidSaliencyCap(
                config.belief.max_saliency_events_per_emission,
            ));
        }
        if config.belief.snapshot_interval_ticks == 0 {
            return Err(ConfigError::InvalidSnapshotInterval(
                config.belief.snapshot_interval_ticks,
            ));
        }

        if config.planner.max_horizon == 0 {
            return Err(ConfigError::InvalidPlannerBound(
                "max_horizon must be at least 1".to_string(),
            ));
        }
        if config.planner.max_branch_factor == 0 {
            return Err(ConfigError::InvalidPlannerBound(
                "max_branch_factor must be at least 1".to_string(),
            ));
        }
        if config.planner.max_policy_nodes == 0 {
            return Err(ConfigError::InvalidPlannerBound(
                "max_policy_nodes must be at least 1".to_string(),
            ));
        }

        if config.loop_breaker.threshold == 0 {
            return Err(ConfigError::InvalidLoopThreshold(
                config.loop_breaker.threshold,
            ));
        }

        if config.task_history.max_limit == 0 || config.task_history.max_limit > 50 {
            return Err(ConfigError::InvalidHistoryLimit(config.task_history.max_limit));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
