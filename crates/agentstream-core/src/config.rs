//! Client configuration.
//!
//! Settings come from three layers, later ones winning:
//! 1. Built-in defaults (a local development backend)
//! 2. An optional JSON file (`ClientConfig::load`)
//! 3. `AGENTSTREAM_*` environment variables (`ClientConfig::apply_env`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::DEFAULT_SENTINEL;

pub const ENV_BASE_URL: &str = "AGENTSTREAM_BASE_URL";
pub const ENV_AUTH_TOKEN: &str = "AGENTSTREAM_AUTH_TOKEN";
pub const ENV_LOG_DIR: &str = "AGENTSTREAM_LOG_DIR";

/// Backend used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8123/api";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which transport a turn without an image should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Event stream for text, chunked fetch when an image is attached.
    #[default]
    Auto,
    /// Always use the chunked-fetch fallback.
    Chunked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that agent paths are appended to.
    pub base_url: String,
    /// Payload content that ends a stream.
    pub sentinel: String,
    pub connect_timeout_secs: u64,
    /// Size of each body read in chunked-fetch mode.
    pub read_chunk_size: usize,
    /// Header carrying the auth token.
    pub auth_header: String,
    pub auth_token: Option<String>,
    pub transport: TransportPreference,
    /// Directory for per-turn wire transcripts. No transcripts when unset.
    pub log_dir: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            connect_timeout_secs: 10,
            read_chunk_size: 8192,
            auth_header: "satoken".to_string(),
            auth_token: None,
            transport: TransportPreference::Auto,
            log_dir: None,
            history_path: None,
        }
    }
}

impl ClientConfig {
    /// Load a config file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `AGENTSTREAM_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Overlay variables from an arbitrary lookup. Empty values are ignored.
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(token) = get(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Join the base URL with an endpoint path without doubling slashes.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn defaults_point_at_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8123/api");
        assert_eq!(config.sentinel, "[DONE]");
        assert_eq!(config.auth_header, "satoken");
        assert_eq!(config.transport, TransportPreference::Auto);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn endpoint_url_joins_cleanly() {
        let mut config = ClientConfig::default();
        assert_eq!(
            config.endpoint_url("/ai/manus/chat"),
            "http://localhost:8123/api/ai/manus/chat"
        );
        config.base_url = "/api/".to_string();
        assert_eq!(config.endpoint_url("ai/manus/chat"), "/api/ai/manus/chat");
    }

    #[test]
    fn load_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"base_url": "https://agents.example.com/api", "transport": "chunked"}"#,
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "https://agents.example.com/api");
        assert_eq!(config.transport, TransportPreference::Chunked);
        assert_eq!(config.sentinel, "[DONE]");
        assert_eq!(config.read_chunk_size, 8192);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = ClientConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn load_invalid_json_is_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = ClientConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_URL, "https://prod.example.com/api"),
            (ENV_AUTH_TOKEN, "secret"),
            (ENV_LOG_DIR, "/tmp/agentstream-logs"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url, "https://prod.example.com/api");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/agentstream-logs")));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = ClientConfig::default();
        config.apply_vars(|_| Some("  ".to_string()));
        assert_eq!(config, ClientConfig::default());
    }
}
