// src/config.rs
// Layered settings: defaults, JSON file, environment, command line

use crate::api::{DEFAULT_CSRF_COOKIE, DEFAULT_CSRF_HEADER};
use crate::controller::poll::{PollPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_TRANSIENT_RETRIES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "excel-uploader";
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "EXCEL_UPLOADER_BASE_URL";
pub const ENV_COOKIE: &str = "EXCEL_UPLOADER_COOKIE";
pub const ENV_POLL_INTERVAL_MS: &str = "EXCEL_UPLOADER_POLL_INTERVAL_MS";
pub const ENV_MAX_POLLS: &str = "EXCEL_UPLOADER_MAX_POLLS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config directory on this platform; pass --config")]
    NoConfigDir,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to save config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    /// Raw `Cookie` header of a logged-in session
    pub cookie: Option<String>,
    pub csrf_cookie_name: String,
    pub csrf_header_name: String,
    pub poll_interval_ms: u64,
    pub max_polls: Option<u32>,
    pub transient_retries: u8,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie: None,
            csrf_cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header_name: DEFAULT_CSRF_HEADER.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_polls: None,
            transient_retries: DEFAULT_TRANSIENT_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Values given on the command line; `None` keeps the lower layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub cookie: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_polls: Option<u32>,
}

impl AppConfig {
    /// Apply `EXCEL_UPLOADER_*` variables read through `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(cookie) = lookup(ENV_COOKIE) {
            self.cookie = Some(cookie);
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_env(ENV_POLL_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_POLLS) {
            self.max_polls = Some(parse_env(ENV_MAX_POLLS, &value)?);
        }

        normalize_config(self);
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(cookie) = overrides.cookie {
            self.cookie = Some(cookie);
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(max_polls) = overrides.max_polls {
            self.max_polls = Some(max_polls);
        }

        normalize_config(self);
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_polls,
            transient_retries: self.transient_retries,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

/// Read the config file, creating it with defaults when missing.
///
/// A file that no longer parses is copied to `config.json.bak` and replaced
/// with defaults.
pub fn load_or_create(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        let config = AppConfig::default();
        save_raw(path, &config)?;
        tracing::info!("Created default config at {}", path.display());
        return Ok(config);
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str::<AppConfig>(&raw) {
        Ok(mut config) => {
            normalize_config(&mut config);
            Ok(config)
        }
        Err(e) => {
            let backup = path.with_extension("json.bak");
            tracing::warn!(
                "Config {} is unreadable ({}); moved aside to {}",
                path.display(),
                e,
                backup.display()
            );
            let _ = fs::copy(path, &backup);
            let config = AppConfig::default();
            save_raw(path, &config)?;
            Ok(config)
        }
    }
}

pub fn save_raw(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn normalize_config(config: &mut AppConfig) {
    let base_url = config.base_url.trim().trim_end_matches('/');
    config.base_url = if base_url.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        base_url.to_string()
    };

    config.cookie = config
        .cookie
        .take()
        .map(|cookie| cookie.trim().to_string())
        .filter(|cookie| !cookie.is_empty());

    if config.csrf_cookie_name.trim().is_empty() {
        config.csrf_cookie_name = DEFAULT_CSRF_COOKIE.to_string();
    }
    if config.csrf_header_name.trim().is_empty() {
        config.csrf_header_name = DEFAULT_CSRF_HEADER.to_string();
    }
    if config.poll_interval_ms == 0 {
        config.poll_interval_ms = DEFAULT_POLL_INTERVAL.as_millis() as u64;
    }
    if config.max_polls == Some(0) {
        config.max_polls = None;
    }
    if config.request_timeout_secs == 0 {
        config.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
    }
}
