//! Outbound side of the chat connector: post activities into conversations.
//!
//! `ActivitySender` is the seam the adapter talks to; `BotConnector` is the HTTP
//! implementation against the connector's REST API.

mod client;

pub use client::BotConnector;

use crate::activity::Activity;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("connector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("connector api error: {0}")]
    Api(String),
    #[error("connector auth failed: {0}")]
    Auth(String),
    #[error("activity cannot be routed: missing {0}")]
    Unroutable(&'static str),
}

/// Sends one outbound activity. The activity must already carry its routing fields
/// (service url, conversation, optional reply-to id).
#[async_trait]
pub trait ActivitySender: Send + Sync {
    async fn send_activity(&self, activity: &Activity) -> Result<(), ConnectorError>;
}
