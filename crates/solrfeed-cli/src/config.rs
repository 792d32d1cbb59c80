//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use solrfeed_core::HttpConfig;

/// Global configuration for solrfeed
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub http: HttpSection,
    pub relsyn: RelsynConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub chunk_size: usize,
    pub workers: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: solrfeed_index::DEFAULT_CHUNK_SIZE.get(),
            workers: 1,
        }
    }
}

/// Timeouts in seconds; absent means no client-side deadline.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
pub struct HttpSection {
    pub request_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelsynConfig {
    pub collection: String,
}

impl Default for RelsynConfig {
    fn default() -> Self {
        Self {
            collection: "relsyn".to_string(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub chunk_size: Option<usize>,
    pub workers: Option<usize>,
    pub request_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
}

/// Effective settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: solrfeed_index::Config,
    pub http: HttpConfig,
    pub relsyn_collection: String,
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./solrfeed.toml (current directory)
    /// 2. ~/.config/solrfeed/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("solrfeed.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "solrfeed") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Merge CLI overrides and validate.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings> {
        let chunk_size = overrides.chunk_size.unwrap_or(self.index.chunk_size);
        let workers = overrides.workers.unwrap_or(self.index.workers);
        anyhow::ensure!(chunk_size > 0, "chunk size must be at least 1");
        anyhow::ensure!(workers > 0, "workers must be at least 1");
        let pipeline = solrfeed_index::Config::new(chunk_size, workers)
            .context("invalid pipeline settings")?;

        let secs = |s: Option<u64>| s.filter(|&s| s > 0).map(Duration::from_secs);
        let http = HttpConfig {
            request_timeout: secs(overrides.request_timeout.or(self.http.request_timeout)),
            connect_timeout: secs(overrides.connect_timeout.or(self.http.connect_timeout)),
        };

        anyhow::ensure!(
            !self.relsyn.collection.is_empty(),
            "relsyn.collection must not be empty"
        );

        Ok(Settings {
            pipeline,
            http,
            relsyn_collection: self.relsyn.collection.clone(),
        })
    }
}
