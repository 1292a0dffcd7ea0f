use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::period::{Granularity, TimePeriod};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub server: Server,
    pub database: Database,
    pub backend: Backend,
    #[serde(default)]
    pub dashboard: Dashboard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backend {
    pub stats_api_url: String,
    pub functions_url: String,
    /// Bearer for the `fetch-wagers` function. Without it the visualize
    /// path is unavailable.
    #[serde(default)]
    pub functions_jwt: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub default_period: TimePeriod,
    #[serde(default)]
    pub default_granularity: Granularity,
    /// Offset of the operator's local day from UTC, used for period ranges.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_top_users")]
    pub top_users: usize,
}

fn default_top_users() -> usize {
    100
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            default_period: TimePeriod::default(),
            default_granularity: Granularity::default(),
            utc_offset_minutes: 0,
            top_users: default_top_users(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.server.port > 0, "server.port must be > 0");
        anyhow::ensure!(
            self.backend.request_timeout_secs > 0,
            "backend.request_timeout_secs must be > 0"
        );
        for (name, url) in [
            ("backend.stats_api_url", &self.backend.stats_api_url),
            ("backend.functions_url", &self.backend.functions_url),
        ] {
            reqwest::Url::parse(url).with_context(|| format!("{name} is not an absolute URL"))?;
        }
        anyhow::ensure!(
            self.dashboard.utc_offset_minutes.abs() < 24 * 60,
            "dashboard.utc_offset_minutes must be within one day"
        );
        anyhow::ensure!(self.dashboard.top_users > 0, "dashboard.top_users must be > 0");
        Ok(())
    }

    /// First existing `config/dashboard.toml`, looking in the working
    /// directory, then next to the executable and its parents.
    pub fn default_config_path() -> PathBuf {
        let relative = Path::new("config").join("dashboard.toml");
        if relative.exists() {
            return relative;
        }
        if let Ok(exe) = std::env::current_exe() {
            for dir in exe.ancestors().skip(1).take(4) {
                let candidate = dir.join(&relative);
                if candidate.exists() {
                    return candidate;
                }
            }
        }
        relative
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
