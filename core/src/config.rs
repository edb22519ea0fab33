//! Client configuration.
//!
//! State and config live under the Vizor home directory (`$VIZOR_HOME`,
//! default `~/.vizor`). An optional `config.toml` in that directory
//! overrides the defaults; `VIZOR_BASE_URL` overrides the file.

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable overriding the home directory.
pub const VIZOR_HOME_ENV: &str = "VIZOR_HOME";

/// Environment variable overriding the service base URL.
pub const VIZOR_BASE_URL_ENV: &str = "VIZOR_BASE_URL";

/// Production endpoint of the analysis service.
pub const DEFAULT_BASE_URL: &str = "https://random.test.morj.men";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const CONFIG_FILE: &str = "config.toml";

/// Resolve the Vizor home directory.
pub fn vizor_home() -> io::Result<PathBuf> {
    // Check VIZOR_HOME env first
    if let Ok(home) = std::env::var(VIZOR_HOME_ENV) {
        return Ok(PathBuf::from(home));
    }

    // Fall back to ~/.vizor
    let home = dirs::home_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Could not determine home directory")
    })?;

    Ok(home.join(".vizor"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the analysis service, no trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for one HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from `<home>/config.toml`; a missing file yields
    /// the defaults. `VIZOR_BASE_URL` takes precedence over the file.
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };

        if let Ok(base_url) = std::env::var(VIZOR_BASE_URL_ENV) {
            config.base_url = base_url;
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
