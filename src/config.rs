//! Application configuration.
//!
//! Values come from an optional TOML file, then from `AERIUM_*` environment
//! variables, e.g. `AERIUM_CACHE__TTL_SECS=30` or `AERIUM_SCHEDULER__USER=3`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aerium_types::{SettingsPatch, Source, UserId};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub notify: NotifyConfig,
    pub generator: GeneratorConfig,
    pub scheduler: SchedulerConfig,
    /// Applied to the global settings scope at startup.
    pub settings: SettingsPatch,
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load from `path` (if any) layered under the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("AERIUM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        config
            .try_deserialize()
            .context("invalid configuration")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Unread events buffered per subscriber.
    pub capacity: usize,
    /// Collector address for newline-delimited JSON events.
    pub tcp: Option<String>,
    /// File overwritten with the latest event.
    pub file: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            tcp: None,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_value: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_value: aerium_core::DEFAULT_BASE_VALUE,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Follow this user's settings instead of the global scope.
    pub user: Option<u64>,
    pub source: Source,
}

impl SchedulerConfig {
    pub fn user_id(&self) -> Option<UserId> {
        self.user.map(UserId)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Readings older than this many days are purged.
    pub days: u64,
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.days * 24 * 3600)
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 90 }
    }
}
