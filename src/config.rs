//! Client configuration.
//!
//! Values resolve in three layers: built-in defaults, then an optional JSON
//! file named by `STREAM_CHAT_CONFIG_PATH`, then individual environment
//! overrides. Blank environment values are treated as unset.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_api::url::{DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_PATH};
use chat_api::ChatApiConfig;
use serde::Deserialize;

pub const CONFIG_PATH_ENV: &str = "STREAM_CHAT_CONFIG_PATH";
pub const BASE_URL_ENV: &str = "STREAM_CHAT_BASE_URL";
pub const MODEL_ENV: &str = "STREAM_CHAT_MODEL";
pub const TIMEOUT_ENV: &str = "STREAM_CHAT_TIMEOUT_SEC";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    #[must_use]
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamChatConfig {
    pub base_url: String,
    pub chat_path: String,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for StreamChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHAT_BASE_URL.to_string(),
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            model: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    chat_path: Option<String>,
    model: Option<String>,
    timeout_sec: Option<u64>,
}

impl StreamChatConfig {
    /// Resolves configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(env_string_opt)
    }

    /// Resolves configuration through `lookup`, which stands in for the
    /// environment.
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(CONFIG_PATH_ENV) {
            config.apply_file(&read_file_config(Path::new(&path))?)?;
        }

        if let Some(base_url) = lookup(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        if let Some(model) = lookup(MODEL_ENV) {
            config.model = Some(model);
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let seconds = raw.trim().parse::<u64>().map_err(|error| {
                ConfigError::invalid(TIMEOUT_ENV, format!("{raw:?} is not a whole number: {error}"))
            })?;
            config.timeout = Some(timeout_from_secs(TIMEOUT_ENV, seconds)?);
        }

        tracing::debug!(
            base_url = %config.base_url,
            model = config.model.as_deref().unwrap_or("<default>"),
            timeout = ?config.timeout,
            "resolved client configuration"
        );
        Ok(config)
    }

    pub fn to_api_config(&self) -> ChatApiConfig {
        let mut api =
            ChatApiConfig::new(self.base_url.clone()).with_chat_path(self.chat_path.clone());
        if let Some(model) = &self.model {
            api = api.with_model(model.clone());
        }
        if let Some(timeout) = self.timeout {
            api = api.with_timeout(timeout);
        }
        api
    }

    fn apply_file(&mut self, file: &FileConfig) -> Result<(), ConfigError> {
        if let Some(base_url) = non_blank(file.base_url.as_deref()) {
            self.base_url = base_url;
        }
        if let Some(chat_path) = non_blank(file.chat_path.as_deref()) {
            self.chat_path = chat_path;
        }
        if let Some(model) = non_blank(file.model.as_deref()) {
            self.model = Some(model);
        }
        if let Some(seconds) = file.timeout_sec {
            self.timeout = Some(timeout_from_secs("timeout_sec", seconds)?);
        }
        Ok(())
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn timeout_from_secs(key: &'static str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::invalid(key, "timeout must be at least one second"));
    }
    Ok(Duration::from_secs(seconds))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_blank(Some(&value)))
}
