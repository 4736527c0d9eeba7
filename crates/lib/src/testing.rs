//! Test doubles shared by unit tests: a scripted engine and a recording connector.

use crate::activity::{Activity, ChannelAccount, ConversationAccount, Entity};
use crate::connector::{ActivitySender, ConnectorError};
use crate::engine::{EngineClient, EngineError, EngineOutput, EngineResponse};
use crate::normalize::EngineInput;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub fn message_activity(text: &str) -> Activity {
    Activity {
        typ: "message".into(),
        id: Some("act-1".into()),
        service_url: Some("http://connector.test".into()),
        channel_id: Some("emulator".into()),
        from: Some(ChannelAccount {
            id: "user-1".into(),
            name: Some("Ada Lovelace".into()),
            role: None,
        }),
        conversation: Some(ConversationAccount {
            id: "conv-1".into(),
            ..Default::default()
        }),
        recipient: Some(ChannelAccount {
            id: "bot-1".into(),
            name: Some("Relay".into()),
            role: None,
        }),
        text: Some(text.into()),
        entities: Some(vec![Entity {
            typ: "ClientCapabilities".into(),
            locale: Some("en-US".into()),
            country: Some("US".into()),
            platform: None,
        }]),
        ..Default::default()
    }
}

pub fn update_activity(member_ids: &[&str]) -> Activity {
    let mut a = message_activity("");
    a.typ = "conversationUpdate".into();
    a.text = None;
    a.members_added = Some(
        member_ids
            .iter()
            .map(|id| ChannelAccount {
                id: id.to_string(),
                ..Default::default()
            })
            .collect(),
    );
    a
}

pub fn engine_reply(session_id: &str, text: &str, extension: Option<String>) -> EngineResponse {
    let mut parameters = serde_json::Map::new();
    if let Some(ext) = extension {
        parameters.insert(
            crate::chunker::EXTENSION_PARAMETER.to_string(),
            serde_json::Value::String(ext),
        );
    }
    EngineResponse {
        status: 0,
        message: None,
        session_id: Some(session_id.to_string()),
        output: EngineOutput {
            text: text.to_string(),
            parameters,
        },
    }
}

/// Engine that answers from a script and records what it was asked.
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Result<EngineResponse, String>>>,
    seen: Mutex<Vec<(Option<String>, String)>>,
    closed: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Result<EngineResponse, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn sessions_seen(&self) -> Vec<Option<String>> {
        self.seen.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn texts_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn closed_sessions(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineClient for ScriptedEngine {
    async fn send_input(
        &self,
        session_id: Option<&str>,
        input: &EngineInput,
    ) -> Result<EngineResponse, EngineError> {
        self.seen
            .lock()
            .unwrap()
            .push((session_id.map(str::to_string), input.text.clone()));
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(res)) => Ok(res),
            Some(Err(e)) => Err(EngineError::Api(e)),
            None => Err(EngineError::Api("no scripted response".into())),
        }
    }

    async fn close_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.closed.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

enum Failure {
    Never,
    Always,
    Conversation(String),
}

/// Connector that records delivered activities; can be told to fail.
pub struct RecordingSender {
    sent: Mutex<Vec<Activity>>,
    failure: Failure,
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Failure::Never,
        }
    }
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            failure: Failure::Always,
            ..Default::default()
        }
    }

    pub fn failing_for(conversation_id: &str) -> Self {
        Self {
            failure: Failure::Conversation(conversation_id.to_string()),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Activity> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivitySender for RecordingSender {
    async fn send_activity(&self, activity: &Activity) -> Result<(), ConnectorError> {
        let fail = match &self.failure {
            Failure::Never => false,
            Failure::Always => true,
            Failure::Conversation(id) => activity.conversation_id() == Some(id.as_str()),
        };
        if fail {
            return Err(ConnectorError::Api("503 unavailable".into()));
        }
        self.sent.lock().unwrap().push(activity.clone());
        Ok(())
    }
}
