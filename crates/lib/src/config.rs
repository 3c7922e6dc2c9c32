//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.toolchat/config.json`) and environment.

use crate::client::DEFAULT_BASE_URL;
use crate::stream::{SegmentPolicy, DEFAULT_REASONING_MARKER};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat backend location.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Chat defaults (model, system prompt, answer segmentation).
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Backend base URL and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the chat backend (default "http://127.0.0.1:5000"). Overridden by TOOLCHAT_BACKEND_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Connect timeout in seconds (default 10). The response body is never timed out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentMode {
    /// New answer message only after tool calls.
    ToolBoundary,
    /// Also start one when the reasoning header shows up mid-answer (default).
    #[default]
    ReasoningMarker,
}

/// Chat defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Model id to use. When unset, the backend's default model is used.
    pub model: Option<String>,

    /// Extra system prompt sent with every turn; the backend prepends it to its own.
    #[serde(default)]
    pub system_prompt: String,

    /// How answer text is split into messages (`segmentPolicy`; `segmentMode` is accepted too).
    #[serde(default, rename = "segmentPolicy", alias = "segmentMode")]
    pub segment_mode: SegmentMode,

    /// Reasoning header to look for in `reasoningMarker` mode (default "思考过程").
    pub reasoning_marker: Option<String>,
}

impl ChatConfig {
    pub fn segment_policy(&self) -> SegmentPolicy {
        match self.segment_mode {
            SegmentMode::ToolBoundary => SegmentPolicy::ToolBoundary,
            SegmentMode::ReasoningMarker => SegmentPolicy::ReasoningMarker(
                self.reasoning_marker
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_REASONING_MARKER.to_string()),
            ),
        }
    }
}

/// Resolve the backend URL: env TOOLCHAT_BACKEND_URL overrides config.
pub fn resolve_backend_url(config: &Config) -> String {
    std::env::var("TOOLCHAT_BACKEND_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .unwrap_or_else(|| config.backend.base_url.trim().to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TOOLCHAT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".toolchat").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, the default path, or TOOLCHAT_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.backend.base_url, "http://127.0.0.1:5000");
        assert_eq!(c.backend.timeout_secs, 10);
        assert_eq!(c.chat.segment_mode, SegmentMode::ReasoningMarker);
        assert_eq!(
            c.chat.segment_policy(),
            SegmentPolicy::ReasoningMarker("思考过程".to_string())
        );
    }

    #[test]
    fn parses_camel_case_and_fills_defaults() {
        let c: Config = serde_json::from_str(
            r#"{"backend":{"baseUrl":"http://h:1"},"chat":{"model":"qwen-plus","segmentPolicy":"toolBoundary"}}"#,
        )
        .unwrap();
        assert_eq!(c.backend.base_url, "http://h:1");
        assert_eq!(c.backend.timeout_secs, 10);
        assert_eq!(c.chat.model.as_deref(), Some("qwen-plus"));
        assert_eq!(c.chat.segment_policy(), SegmentPolicy::ToolBoundary);
    }

    #[test]
    fn segment_mode_key_is_accepted() {
        let c: ChatConfig = serde_json::from_str(r#"{"segmentMode":"toolBoundary"}"#).unwrap();
        assert_eq!(c.segment_policy(), SegmentPolicy::ToolBoundary);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["segmentPolicy"], "toolBoundary");
    }

    #[test]
    fn custom_reasoning_marker() {
        let mut chat = ChatConfig::default();
        chat.reasoning_marker = Some("THINKING".into());
        assert_eq!(
            chat.segment_policy(),
            SegmentPolicy::ReasoningMarker("THINKING".into())
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("toolchat-config-test-does-not-exist.json");
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("toolchat-config-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ nope").unwrap();
        let err = load_config(Some(path.clone())).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
        let _ = std::fs::remove_file(path);
    }
}
