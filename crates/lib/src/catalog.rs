//! Tool catalog and model list as served by the backend, plus the check that gates sending.
//!
//! None of this reaches the streaming core; it only decides whether a send may start.

use serde::{Deserialize, Serialize};

/// A tool the backend can call on the model's behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default = "unknown_package")]
    pub package: String,
    #[serde(default)]
    pub description: String,
    /// JSON-schema style parameter map, passed through untouched.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

fn unknown_package() -> String {
    "unknown".to_string()
}

/// `GET /api/tools` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolListing {
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
    #[serde(default)]
    pub selected: Vec<String>,
    /// Set when the backend has no tool server connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolListing {
    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.iter().any(|s| s == name)
    }

    /// Names from `wanted` that the catalog does not know.
    pub fn unknown<'a>(&self, wanted: &'a [String]) -> Vec<&'a str> {
        wanted
            .iter()
            .filter(|w| !self.tools.iter().any(|t| &t.name == *w))
            .map(String::as_str)
            .collect()
    }
}

/// `POST /api/tools/select` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub selected_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// `GET /api/config` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Page settings owned by the backend; opaque here.
    #[serde(default)]
    pub ui: serde_json::Value,
}

impl AppConfig {
    pub fn model(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendBlocked {
    #[error("message is empty")]
    EmptyMessage,
    #[error("no model selected")]
    NoModel,
}

/// Whether a send may start with the current input and selection.
pub struct SendGate;

impl SendGate {
    pub fn check(message: &str, model: Option<&str>) -> Result<(), SendBlocked> {
        if message.trim().is_empty() {
            return Err(SendBlocked::EmptyMessage);
        }
        match model {
            Some(m) if !m.trim().is_empty() => Ok(()),
            _ => Err(SendBlocked::NoModel),
        }
    }
}
