//! Turn boundary: load state, run the bot, save state; catch-all error policy; proactive sends.

use crate::activity::{Activity, ConversationReference};
use crate::bot::{RelayBot, TurnError, TurnSummary};
use crate::connector::{ActivitySender, ConnectorError};
use crate::references::ReferenceStore;
use crate::state::{state_key, ConversationState, StateStore};
use std::sync::Arc;

pub const TURN_ERROR_MESSAGE: &str = "The bot encountered an error or bug.";
pub const TURN_ERROR_FOLLOWUP: &str =
    "To continue to run this bot, please fix the bot source code.";
const ERROR_VALUE_TYPE: &str = "https://www.botframework.com/schemas/error";

/// Per-turn view of the conversation: the inbound activity, where replies go, and the
/// working copy of conversation state.
pub struct TurnContext<'a> {
    pub activity: Activity,
    reference: ConversationReference,
    sender: &'a dyn ActivitySender,
    pub state: ConversationState,
}

impl<'a> TurnContext<'a> {
    pub fn new(
        activity: Activity,
        reference: ConversationReference,
        sender: &'a dyn ActivitySender,
        state: ConversationState,
    ) -> Self {
        Self {
            activity,
            reference,
            sender,
            state,
        }
    }

    pub fn reference(&self) -> &ConversationReference {
        &self.reference
    }

    /// Send an activity as a reply to the inbound one.
    pub async fn send_activity(&mut self, activity: Activity) -> Result<(), ConnectorError> {
        let routed = self.reference.apply(activity, self.activity.id.as_deref());
        self.sender.send_activity(&routed).await
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ConnectorError> {
        self.send_activity(Activity::message(text)).await
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    Completed(TurnSummary),
    /// The bot failed; the apology was sent (as far as possible) and the conversation
    /// state was cleared.
    Recovered { error: String },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifySummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct Adapter {
    bot: RelayBot,
    storage: Arc<dyn StateStore>,
    sender: Arc<dyn ActivitySender>,
}

impl Adapter {
    pub fn new(
        bot: RelayBot,
        storage: Arc<dyn StateStore>,
        sender: Arc<dyn ActivitySender>,
    ) -> Self {
        Self {
            bot,
            storage,
            sender,
        }
    }

    /// Run one turn. Returns `InvalidActivity` (before any state is touched) when the activity
    /// cannot be addressed; every other bot failure is recovered here.
    pub async fn process_activity(&self, activity: Activity) -> Result<TurnOutcome, TurnError> {
        if activity.typ.is_empty() {
            return Err(TurnError::InvalidActivity("type"));
        }
        let channel_id = activity
            .channel_id
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or(TurnError::InvalidActivity("channelId"))?;
        let reference = ConversationReference::from_activity(&activity)
            .ok_or(TurnError::InvalidActivity("conversation.id"))?;
        let key = state_key(&channel_id, &reference.conversation.id);

        let state = self.storage.load(&key).await?.unwrap_or_default();
        let mut ctx = TurnContext::new(activity, reference, self.sender.as_ref(), state);
        match self.bot.on_turn(&mut ctx).await {
            Ok(summary) => {
                self.storage.save(&key, ctx.state.clone()).await?;
                Ok(TurnOutcome::Completed(summary))
            }
            Err(e) => {
                self.on_turn_error(&mut ctx, &key, &e).await?;
                Ok(TurnOutcome::Recovered {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Trace + two fixed messages to the user, then wipe the conversation's state. State is
    /// wiped even when the messages cannot be delivered; the delivery error is returned.
    async fn on_turn_error(
        &self,
        ctx: &mut TurnContext<'_>,
        key: &str,
        error: &TurnError,
    ) -> Result<(), TurnError> {
        log::error!("[on_turn_error] unhandled error: {}", error);

        let trace = Activity::trace(
            "OnTurnError Trace",
            serde_json::Value::String(error.to_string()),
            ERROR_VALUE_TYPE,
            "TurnError",
        );
        let delivered = async {
            ctx.send_activity(trace).await?;
            ctx.send_text(TURN_ERROR_MESSAGE).await?;
            ctx.send_text(TURN_ERROR_FOLLOWUP).await
        }
        .await;

        self.storage.delete(key).await?;
        if let Some(session_id) = ctx.state.session_id.as_deref() {
            if let Err(e) = self.bot.engine().close_session(session_id).await {
                log::debug!("closing engine session {} failed: {}", session_id, e);
            }
        }
        delivered.map_err(TurnError::from)
    }

    /// Drop stored state for conversations that are no longer tracked. Returns how many
    /// entries were deleted; failures are logged and skipped.
    pub async fn forget(&self, references: &[ConversationReference]) -> usize {
        let mut deleted = 0;
        for reference in references {
            let key = state_key(&reference.channel_id, &reference.conversation.id);
            match self.storage.delete(&key).await {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("dropping state {} failed: {}", key, e),
            }
        }
        deleted
    }

    /// Post a message into an existing conversation without an inbound activity.
    pub async fn continue_conversation(
        &self,
        reference: &ConversationReference,
        activity: Activity,
    ) -> Result<(), ConnectorError> {
        let routed = reference.apply(activity, None);
        self.sender.send_activity(&routed).await
    }

    /// Send `text` to every known conversation. A failed conversation is logged and skipped.
    pub async fn notify_all(&self, references: &ReferenceStore, text: &str) -> NotifySummary {
        let mut summary = NotifySummary::default();
        for reference in references.all().await {
            match self
                .continue_conversation(&reference, Activity::message(text))
                .await
            {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    log::warn!(
                        "proactive message to conversation {} failed: {}",
                        reference.conversation.id,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
