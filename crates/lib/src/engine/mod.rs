//! Remote dialog engine abstraction and HTTP client.
//!
//! The engine is an opaque request/response API: one input (plus the session id, once known)
//! in, one response with the possibly rotated session id, reply text, and output parameters out.

mod http;

pub use http::HttpEngineClient;

use crate::normalize::EngineInput;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("engine api error: {0}")]
    Api(String),
    #[error("engine response could not be decoded: {0}")]
    Decode(String),
}

/// Engine answer for one input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    /// 0 on success; anything else comes with `message`.
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub output: EngineOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineOutput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Sends inputs to the engine. `session_id` is None for the first exchange of a conversation.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn send_input(
        &self,
        session_id: Option<&str>,
        input: &EngineInput,
    ) -> Result<EngineResponse, EngineError>;

    /// End a session on the engine side. Default is a no-op for engines without sessions.
    async fn close_session(&self, _session_id: &str) -> Result<(), EngineError> {
        Ok(())
    }
}
