//! Turn dispatch: route one inbound activity through normalize -> engine -> chunk -> reply.
//!
//! A message runs one engine exchange. A conversation update that adds people sends the
//! static greeting once, then runs one empty-text exchange per added member to fetch the
//! engine's own greeting. Everything else is logged and ignored. Every turn refreshes the
//! conversation reference used for proactive messages.

use crate::activity::{self, Activity};
use crate::adapter::TurnContext;
use crate::chunker::{build_replies, chunk_reply, resolve_extension, Extension, ReplyChunk};
use crate::connector::ConnectorError;
use crate::engine::{EngineClient, EngineError};
use crate::normalize::{EngineInput, NormalizeError};
use crate::references::ReferenceStore;
use crate::state::StateError;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("invalid activity: missing {0}")]
    InvalidActivity(&'static str),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Message,
    MembersAdded,
    Other,
}

/// Result of one engine round trip within a turn.
#[derive(Debug)]
pub enum Exchange {
    /// All chunks were delivered.
    Replied {
        chunks: usize,
        extension: &'static str,
    },
    /// The engine call failed; nothing was sent and the session id is unchanged.
    EngineFailed(EngineError),
    /// The engine answered (session id updated) but a chunk could not be delivered;
    /// remaining chunks were dropped.
    DeliveryFailed { sent: usize, error: ConnectorError },
}

#[derive(Debug)]
pub struct TurnSummary {
    pub kind: TurnKind,
    /// True when the static greeting went out.
    pub greeted: bool,
    pub exchanges: Vec<Exchange>,
}

impl TurnSummary {
    fn new(kind: TurnKind) -> Self {
        Self {
            kind,
            greeted: false,
            exchanges: Vec::new(),
        }
    }
}

pub fn classify(activity: &Activity) -> TurnKind {
    match activity.typ.as_str() {
        activity::MESSAGE => TurnKind::Message,
        activity::CONVERSATION_UPDATE if !activity.added_non_bot_members().is_empty() => {
            TurnKind::MembersAdded
        }
        _ => TurnKind::Other,
    }
}

pub struct RelayBot {
    engine: Arc<dyn EngineClient>,
    references: Arc<ReferenceStore>,
    sheet_id: Option<String>,
    greeting: String,
}

impl RelayBot {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        references: Arc<ReferenceStore>,
        sheet_id: Option<String>,
        greeting: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            references,
            sheet_id,
            greeting: greeting.into(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    pub async fn on_turn(&self, ctx: &mut TurnContext<'_>) -> Result<TurnSummary, TurnError> {
        self.references.upsert(ctx.reference().clone()).await;
        log::info!(
            "turn: {} activity on channel {}",
            ctx.activity.typ,
            ctx.activity.channel_id.as_deref().unwrap_or("-")
        );

        let kind = classify(&ctx.activity);
        let mut summary = TurnSummary::new(kind);
        match kind {
            TurnKind::Message => {
                summary.exchanges.push(self.exchange(ctx, None).await?);
            }
            TurnKind::MembersAdded => {
                let added = ctx.activity.added_non_bot_members().len();
                log::info!("conversation update: {} member(s) added", added);
                ctx.send_text(self.greeting.clone()).await?;
                summary.greeted = true;
                for _ in 0..added {
                    summary.exchanges.push(self.exchange(ctx, Some("")).await?);
                }
            }
            TurnKind::Other => {
                log::info!("[{} event detected]", ctx.activity.typ);
            }
        }
        Ok(summary)
    }

    /// One engine round trip. The returned session id is stored before any chunk is sent.
    async fn exchange(
        &self,
        ctx: &mut TurnContext<'_>,
        text_override: Option<&str>,
    ) -> Result<Exchange, TurnError> {
        let input =
            EngineInput::from_activity(&ctx.activity, self.sheet_id.as_deref(), text_override)?;
        log::info!(
            "got message '{}' from channel {}",
            input.text,
            ctx.activity.channel_id.as_deref().unwrap_or("-")
        );

        let session_id = ctx.state.session_id.clone();
        let response = match self.engine.send_input(session_id.as_deref(), &input).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("failed when sending input to engine: {}", e);
                return Ok(Exchange::EngineFailed(e));
            }
        };
        log::info!(
            "got engine response '{}' for session {}",
            response.output.text,
            response.session_id.as_deref().unwrap_or("-")
        );
        match response.session_id {
            Some(id) => ctx.state.session_id = Some(id),
            None => log::warn!("engine response carried no session id; keeping the previous one"),
        }

        let extension = resolve_extension(&response.output.parameters);
        if let Extension::Invalid(ref e) = extension {
            log::warn!("failed when parsing attachment JSON: {}", e);
        }
        let replies = build_replies(chunk_reply(&response.output.text), &extension);
        let total = replies.len();
        for (sent, chunk) in replies.into_iter().enumerate() {
            if let Err(error) = ctx.send_activity(reply_activity(chunk)).await {
                log::warn!("failed to deliver reply chunk {}/{}: {}", sent + 1, total, error);
                return Ok(Exchange::DeliveryFailed { sent, error });
            }
        }
        Ok(Exchange::Replied {
            chunks: total,
            extension: extension.kind(),
        })
    }
}

fn reply_activity(chunk: ReplyChunk) -> Activity {
    let mut activity = Activity::message(chunk.text);
    activity.attachments = chunk.attachments;
    activity.suggested_actions = chunk.suggested_actions;
    activity
}
