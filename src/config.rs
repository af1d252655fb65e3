use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub relgraph: RelgraphConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Storage and logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelgraphConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("relgraph.db"),
            migrations_dir: default_migrations_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Paged query limits
#[derive(Debug, Clone, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Link display projection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_link_icon")]
    pub default_link_icon: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_link_icon: default_link_icon(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_max_page_size() -> usize {
    1000
}

fn default_link_icon() -> String {
    "icon-link".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.relgraph.db_path.as_os_str().is_empty() {
            anyhow::bail!("relgraph.db_path must not be empty");
        }

        if self.paging.default_page_size == 0 {
            anyhow::bail!("paging.default_page_size must be greater than 0");
        }

        if self.paging.max_page_size == 0 {
            anyhow::bail!("paging.max_page_size must be greater than 0");
        }

        if self.paging.default_page_size > self.paging.max_page_size {
            anyhow::bail!(
                "paging.default_page_size ({}) must not exceed paging.max_page_size ({})",
                self.paging.default_page_size,
                self.paging.max_page_size
            );
        }

        if self.display.default_link_icon.trim().is_empty() {
            anyhow::bail!("display.default_link_icon must not be empty");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.relgraph.db_path
    }

    /// Get the migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.relgraph.migrations_dir
    }
}
