//! Application configuration management.
//!
//! The deployment flag that selects direct-provider or backend-mediated
//! login lives here, together with the endpoints both paths talk to.
//!
//! Configuration is stored at `~/.config/hubkeeper/config.json`; every field
//! can be overridden with a `HUBKEEPER_*` environment variable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "hubkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_GRAPHQL_URL: &str = "https://api.hubkeeper.app/graphql";
const DEFAULT_GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// How a login round trip reaches a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Talk to GitHub directly and synthesize a free-tier user
    Direct,
    /// Exchange tokens through the backend GraphQL service
    #[default]
    Backend,
}

impl std::str::FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(AuthMode::Direct),
            "backend" => Ok(AuthMode::Backend),
            other => Err(anyhow::anyhow!("Unknown auth mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graphql_url: String,
    pub github_api_base_url: String,
    pub auth_mode: AuthMode,
    /// Direct mode only: lift the single-column limit of the free plan
    pub unlimited_columns: bool,
    pub is_development: bool,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            github_api_base_url: DEFAULT_GITHUB_API_BASE_URL.to_string(),
            auth_mode: AuthMode::default(),
            unlimited_columns: false,
            is_development: cfg!(debug_assertions),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("HUBKEEPER_GRAPHQL_URL") {
            self.graphql_url = url;
        }
        if let Some(url) = var("HUBKEEPER_GITHUB_API_BASE_URL") {
            self.github_api_base_url = url;
        }
        if let Some(mode) = var("HUBKEEPER_AUTH_MODE") {
            self.auth_mode = mode.parse()?;
        }
        if let Some(flag) = var("HUBKEEPER_UNLIMITED_COLUMNS") {
            self.unlimited_columns = parse_flag(&flag);
        }
        if let Some(flag) = var("HUBKEEPER_DEVELOPMENT") {
            self.is_development = parse_flag(&flag);
        }
        if let Some(secs) = var("HUBKEEPER_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid HUBKEEPER_REQUEST_TIMEOUT_SECS: {}", secs))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
