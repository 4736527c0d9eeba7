//! Per-conversation state (the engine session id) and its storage.
//!
//! State is keyed like the connector framework keys conversation state:
//! `{channel_id}/conversations/{conversation_id}`. A turn loads it once, mutates a local
//! copy, and saves it when the turn finishes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persisted state for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Engine session id; None until the first exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Storage key for a conversation's state.
pub fn state_key(channel_id: &str, conversation_id: &str) -> String {
    format!("{}/conversations/{}", channel_id, conversation_id)
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state storage failed: {0}")]
    Storage(String),
}

/// Backing store for conversation state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<ConversationState>, StateError>;
    async fn save(&self, key: &str, state: ConversationState) -> Result<(), StateError>;
    async fn delete(&self, key: &str) -> Result<(), StateError>;
}

/// In-memory store; state is lost on restart.
pub struct MemoryStorage {
    inner: Arc<RwLock<HashMap<String, ConversationState>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl StateStore for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<ConversationState>, StateError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, state: ConversationState) -> Result<(), StateError> {
        self.inner.write().await.insert(key.to_string(), state);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}
