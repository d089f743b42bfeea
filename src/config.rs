//! Client configuration loaded from `~/.kb/config.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BoardError, Result};

pub const DEFAULT_API_BASE: &str = "http://localhost:8001/api";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_undo_window_ms() -> u64 {
    5_000
}

fn default_shake_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    format!("kb/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings shared by the gateway, the store and the drag engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Base URL of the task service, including the `/api` prefix.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout. No timeout when unset.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// How long a deleted task can be restored.
    #[serde(default = "default_undo_window_ms")]
    pub undo_window_ms: u64,
    /// How long a drag session stays in the shaking state after a drop on nothing.
    #[serde(default = "default_shake_ms")]
    pub shake_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            api_base: default_api_base(),
            request_timeout_secs: None,
            undo_window_ms: default_undo_window_ms(),
            shake_ms: default_shake_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl BoardConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(BoardConfig::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: BoardConfig = serde_json::from_str(&raw)
            .map_err(|e| BoardError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(BoardError::Config(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(BoardError::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn undo_window(&self) -> Duration {
        Duration::from_millis(self.undo_window_ms)
    }

    pub fn shake_delay(&self) -> Duration {
        Duration::from_millis(self.shake_ms)
    }

    /// Health endpoint: the base with its `/api` suffix removed, plus `/health`.
    pub fn health_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        let root = base.strip_suffix("/api").unwrap_or(base);
        format!("{root}/health")
    }
}

/// `~/.kb`, falling back to `./.kb` when `HOME` is unset.
pub fn app_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".kb")
}

pub fn default_config_path() -> PathBuf {
    app_dir().join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("kb-config-does-not-exist.json");
        let config = BoardConfig::load(&path).unwrap();
        assert_eq!(config, BoardConfig::default());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.undo_window(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let path = std::env::temp_dir().join(format!("kb-config-{}.json", std::process::id()));
        fs::write(&path, r#"{"shake_ms": 250, "request_timeout_secs": 10}"#).unwrap();
        let config = BoardConfig::load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.shake_ms, 250);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.undo_window_ms, 5_000);
    }

    #[test]
    fn test_health_url_strips_api_suffix() {
        let config = BoardConfig::default().with_api_base("https://tasks.example.com/api/");
        assert_eq!(config.health_url(), "https://tasks.example.com/health");

        let bare = BoardConfig::default().with_api_base("http://127.0.0.1:9000");
        assert_eq!(bare.health_url(), "http://127.0.0.1:9000/health");
    }

    #[test]
    fn test_rejects_non_http_base() {
        let config = BoardConfig::default().with_api_base("ftp://nope");
        assert!(matches!(config.validate(), Err(BoardError::Config(_))));
    }
}
