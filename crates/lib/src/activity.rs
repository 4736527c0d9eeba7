//! Connector wire types: activities, accounts, and conversation references.
//!
//! Field names follow the connector's camelCase JSON. Everything that an inbound payload
//! may omit is an `Option`, so absence is visible to callers instead of failing later.

use serde::{Deserialize, Serialize};

pub const MESSAGE: &str = "message";
pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
pub const TRACE: &str = "trace";

/// A user, bot, or conversation participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Client info entity; the connector puts locale and country here (typically at index 0).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Inbound or outbound event in a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type", default)]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members_added: Option<Vec<ChannelAccount>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Activity {
    /// Plain outbound text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            typ: MESSAGE.to_string(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Trace activity (shown by the emulator, ignored by end-user channels).
    pub fn trace(
        name: impl Into<String>,
        value: serde_json::Value,
        value_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            typ: TRACE.to_string(),
            name: Some(name.into()),
            value: Some(value),
            value_type: Some(value_type.into()),
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation
            .as_ref()
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn recipient_id(&self) -> Option<&str> {
        self.recipient.as_ref().map(|r| r.id.as_str())
    }

    /// Members added in a conversation update, excluding the bot itself (the recipient).
    pub fn added_non_bot_members(&self) -> Vec<&ChannelAccount> {
        let bot_id = self.recipient_id();
        self.members_added
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter(|m| Some(m.id.as_str()) != bot_id)
            .collect()
    }
}

/// Everything needed to post into a conversation later without an inbound activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    pub conversation: ConversationAccount,
    pub channel_id: String,
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl ConversationReference {
    /// Derive a reference from an inbound activity. None when the activity has no conversation id.
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        let conversation = activity.conversation.clone()?;
        if conversation.id.is_empty() {
            return None;
        }
        Some(Self {
            activity_id: activity.id.clone(),
            user: activity.from.clone(),
            bot: activity.recipient.clone(),
            conversation,
            channel_id: activity.channel_id.clone().unwrap_or_default(),
            service_url: activity.service_url.clone().unwrap_or_default(),
            locale: activity.locale.clone(),
        })
    }

    /// Fill routing fields of an outbound activity so it lands in this conversation.
    /// When `reply_to` is set the activity is posted as a reply to that inbound activity id.
    pub fn apply(&self, mut activity: Activity, reply_to: Option<&str>) -> Activity {
        activity.channel_id = Some(self.channel_id.clone());
        activity.service_url = Some(self.service_url.clone());
        activity.conversation = Some(self.conversation.clone());
        activity.from = self.bot.clone();
        activity.recipient = self.user.clone();
        if activity.locale.is_none() {
            activity.locale = self.locale.clone();
        }
        activity.reply_to_id = reply_to.map(str::to_string);
        activity
    }
}
