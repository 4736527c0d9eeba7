//! Inbound activity -> engine input.

use crate::activity::Activity;
use serde::Serialize;

/// Channel prefix the engine uses to tell connector traffic apart from other front ends.
const CHANNEL_PREFIX: &str = "botframework-";

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("activity is missing {0}")]
    MissingField(&'static str),
    #[error("serializing attachments: {0}")]
    Attachments(#[from] serde_json::Error),
}

/// Input record sent to the engine for one exchange. Every field except `text` is sent as an
/// extra request parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInput {
    #[serde(skip)]
    pub text: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<String>,
    pub display_name: String,
    pub last_name: String,
    pub given_name: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub botframework_attachments: Option<String>,
}

impl EngineInput {
    /// Build the engine input for an inbound activity. `text_override` replaces the activity
    /// text (member greetings send an empty input even though the update carries no text).
    pub fn from_activity(
        activity: &Activity,
        sheet_id: Option<&str>,
        text_override: Option<&str>,
    ) -> Result<Self, NormalizeError> {
        let full_name = activity
            .from
            .as_ref()
            .and_then(|f| f.name.as_deref())
            .ok_or(NormalizeError::MissingField("from.name"))?;
        let (given_name, last_name) = split_name(full_name);

        let client_info = activity.entities.as_deref().and_then(|e| e.first());
        if client_info.is_none() {
            log::debug!("activity has no entities; sending input without country and locale");
        }
        let country_code = client_info.and_then(|e| e.country.clone());
        let locale = client_info.and_then(|e| e.locale.clone());

        let text = text_override
            .map(str::to_string)
            .or_else(|| activity.text.clone())
            .unwrap_or_default();

        let botframework_attachments = match activity.attachments.as_ref() {
            Some(list) => Some(serde_json::to_string(list)?),
            None => None,
        };

        Ok(Self {
            text,
            channel: format!(
                "{}{}",
                CHANNEL_PREFIX,
                activity.channel_id.as_deref().unwrap_or_default()
            ),
            sheet_id: sheet_id.map(str::to_string),
            display_name: full_name.to_string(),
            name: given_name.clone(),
            given_name,
            last_name,
            country_code,
            locale,
            botframework_attachments,
        })
    }

    /// Extra request parameters (everything but the user text) as key/value pairs.
    pub fn parameters(&self) -> Vec<(String, String)> {
        let value = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        let Some(obj) = value.as_object() else {
            return Vec::new();
        };
        obj.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }
}

/// Split a display name into (given name, "last name").
///
/// The given name is everything before the first space. The "last name" keeps the legacy
/// behavior the engine scripts were written against: it is the first `given.len() + 1`
/// characters of the full name (or `given.len()` when there is nothing after the given
/// name). It does not extract a surname: "Ada Lovelace" yields "Ada ".
pub fn split_name(full_name: &str) -> (String, String) {
    let given = full_name.split(' ').next().unwrap_or_default().to_string();
    let given_len = given.chars().count();
    let take = if full_name.chars().count() > given_len {
        given_len + 1
    } else {
        given_len
    };
    let last = full_name.chars().take(take).collect();
    (given, last)
}
