//! Configuration loaded from `<cache>/config.toml`
//!
//! Every field has a default, so a missing file or section is not an error.
//! Environment variables override the file; CLI flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CONFIG_TOML;
use crate::models::DEFAULT_SIZE;
use crate::remote::{DEFAULT_API_BASE, DEFAULT_JSON_BASE};

/// Cache root override
pub const ENV_CACHE_DIR: &str = "ICONIFY_CACHE_DIR";
/// Corpus directory override
pub const ENV_DATA_DIR: &str = "ICONIFY_DATA_DIR";
/// Set to `1` (or `true`) to disable network access
pub const ENV_OFFLINE: &str = "ICONIFY_OFFLINE";

/// Written by `CacheManager::init` when no config exists
pub const DEFAULT_CONFIG_TOML: &str = r#"[corpus]
# dir = "/path/to/icon-sets"  # Directory holding collections.json and json/

[search]
default_limit = 20
fallback_scan = true  # Scan the corpus when no index has been built

[network]
enabled = true
timeout_secs = 30
api_base = "https://api.iconify.design"
json_base = "https://raw.githubusercontent.com/iconify/icon-sets/master/json"

[style]
default_size = 24
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Corpus directory (None = no bundled corpus)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,

    /// Fall back to scanning the corpus when no index exists
    #[serde(default = "default_true")]
    pub fallback_scan: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            fallback_scan: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_json_base")]
    pub json_base: String,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_timeout_secs(),
            api_base: default_api_base(),
            json_base: default_json_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    #[serde(default = "default_size")]
    pub default_size: u32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            default_size: default_size(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cache root; not part of the file
    #[serde(skip)]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub style: StyleConfig,
}

fn default_limit() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_json_base() -> String {
    DEFAULT_JSON_BASE.to_string()
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

/// Cache root from `ICONIFY_CACHE_DIR`, else the platform cache directory
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = env::var_os(ENV_CACHE_DIR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("iconify-search")
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

impl Config {
    /// Parse config text; unknown keys are ignored
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config.toml")
    }

    /// Load `<cache_dir>/config.toml` (defaults if absent), then apply the environment
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let config_path = cache_dir.join(CONFIG_TOML);

        let mut config = if config_path.exists() {
            let text = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml(&text)?
        } else {
            log::debug!("No config.toml found, using defaults");
            Self::default()
        };

        config.cache_dir = cache_dir.to_path_buf();
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(dir) = env::var_os(ENV_DATA_DIR).filter(|d| !d.is_empty()) {
            log::debug!("Corpus directory from {}", ENV_DATA_DIR);
            self.corpus.dir = Some(PathBuf::from(dir));
        }
        if env_flag(ENV_OFFLINE) {
            log::debug!("Network disabled by {}", ENV_OFFLINE);
            self.network.enabled = false;
        }
    }
}
