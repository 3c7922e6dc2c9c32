//! HTTP client for the chat backend (`http://127.0.0.1:5000` by default).
//!
//! `POST /api/chat` answers with a chunked body of `data: <json>` records; the session id comes back
//! in the `X-Session-ID` header. A backend running in non-streaming mode answers with a JSON
//! `{response, session_id}` object instead, which is re-framed here as `content` + `end` records so
//! callers always drive the same stream path.

use crate::catalog::{AppConfig, SelectionResult, ToolListing};
use crate::stream::EVENT_PREFIX;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Response header carrying the session id.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("session not found on backend")]
    SessionNotFound,
    #[error("invalid backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One chat turn as sent to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub system_prompt: String,
}

/// Open response body plus the session id the backend reported for it.
pub struct ChatStream {
    pub session_id: Option<String>,
    pub body: BoxStream<'static, Result<Vec<u8>, ClientError>>,
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            client: reqwest::Client::new(),
        }
    }

    /// Like [`BackendClient::new`] with a connect timeout. The body itself has no read timeout:
    /// a model round with slow tools can stay silent for a long time.
    pub fn with_connect_timeout(
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /api/chat: start a turn and return its event stream.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatStream, ClientError> {
        let url = format!("{}/api/chat", self.base_url);
        let res = self.client.post(&url).json(request).send().await?;
        if !res.status().is_success() {
            return Err(api_error(res).await);
        }
        let session_id = header_str(&res, SESSION_HEADER).filter(|s| !s.trim().is_empty());
        let is_json = header_str(&res, "content-type")
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let text = res.text().await?;
            let reply: NonStreamingReply = serde_json::from_str(&text)?;
            log::debug!("chat: backend answered in non-streaming mode");
            let body = reply_as_records(&reply.response);
            return Ok(ChatStream {
                session_id: session_id.or(reply.session_id),
                body: stream::once(async move { Ok(body) }).boxed(),
            });
        }
        let body = res
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ClientError::Request))
            .boxed();
        Ok(ChatStream { session_id, body })
    }

    /// POST /api/chat/clear: drop the server-side history for a session.
    pub async fn clear(&self, session_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/chat/clear", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "session_id": session_id }))
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::SessionNotFound);
        }
        if !res.status().is_success() {
            return Err(api_error(res).await);
        }
        Ok(())
    }

    /// GET /api/tools: available tools and the current selection.
    pub async fn tools(&self) -> Result<ToolListing, ClientError> {
        self.get_json("/api/tools").await
    }

    /// POST /api/tools/select: replace the selected tool subset.
    pub async fn select_tools(&self, names: &[String]) -> Result<SelectionResult, ClientError> {
        self.post_json("/api/tools/select", &serde_json::json!({ "tools": names }))
            .await
    }

    /// GET /api/config: model list and defaults.
    pub async fn app_config(&self) -> Result<AppConfig, ClientError> {
        self.get_json("/api/config").await
    }

    /// GET /api/debug/status: backend diagnostics, passed through as JSON.
    pub async fn debug_status(&self) -> Result<serde_json::Value, ClientError> {
        self.get_json("/api/debug/status").await
    }

    /// POST /api/execute_tool: run one tool directly, outside any chat turn.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let reply: ToolExecReply = self
            .post_json(
                "/api/execute_tool",
                &serde_json::json!({ "tool_name": tool_name, "parameters": parameters }),
            )
            .await?;
        Ok(reply.result)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(api_error(res).await);
        }
        Ok(res.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self.client.post(&url).json(body).send().await?;
        if !res.status().is_success() {
            return Err(api_error(res).await);
        }
        Ok(res.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct NonStreamingReply {
    #[serde(default)]
    response: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolExecReply {
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

fn normalize_base_url(base_url: Option<String>) -> String {
    base_url
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn header_str(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Error for a non-success status; prefers the backend's `{"error": ".."}` message.
async fn api_error(res: reqwest::Response) -> ClientError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        });
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Frame a complete answer as the record sequence a streaming backend would have sent.
fn reply_as_records(text: &str) -> Vec<u8> {
    let content = serde_json::json!({ "type": "content", "content": text });
    let end = serde_json::json!({ "type": "end" });
    format!("{EVENT_PREFIX}{content}\n\n{EVENT_PREFIX}{end}\n\n").into_bytes()
}
