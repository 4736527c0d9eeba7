//! Reply chunking and rich-content resolution.
//!
//! The engine answers with one string in which `||` separates the bubbles to send. An
//! optional output parameter carries a card or suggested-action descriptor that belongs on
//! the final bubble.

use serde_json::{Map, Value};

pub const CHUNK_DELIMITER: &str = "||";

/// Output parameter holding the serialized attachment / suggested-actions descriptor.
pub const EXTENSION_PARAMETER: &str = "msbotframework";

/// Split reply text into trimmed, non-empty chunks in order.
///
/// Never returns an empty vec: input with no non-blank segment yields `[""]`.
pub fn chunk_reply(raw: &str) -> Vec<String> {
    let joined = raw
        .split(CHUNK_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(CHUNK_DELIMITER);
    joined
        .trim()
        .split(CHUNK_DELIMITER)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("extension is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("extension has unsupported type: {0}")]
    UnsupportedType(&'static str),
}

/// What to attach to the last chunk.
#[derive(Debug)]
pub enum Extension {
    None,
    SuggestedActions(Value),
    Attachment(Value),
    /// Descriptor present but unusable; the last chunk goes out text-only.
    Invalid(ExtensionError),
}

impl Extension {
    pub fn kind(&self) -> &'static str {
        match self {
            Extension::None => "none",
            Extension::SuggestedActions(_) => "suggestedActions",
            Extension::Attachment(_) => "attachment",
            Extension::Invalid(_) => "invalid",
        }
    }
}

/// Resolve the extension descriptor from the engine's output parameters.
///
/// The descriptor is normally a JSON string. A descriptor with an `actions` field is a
/// suggested-actions set; anything else is treated as a single attachment or rich card.
pub fn resolve_extension(parameters: &Map<String, Value>) -> Extension {
    let Some(raw) = parameters.get(EXTENSION_PARAMETER) else {
        return Extension::None;
    };
    let parsed = match raw {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => return Extension::Invalid(ExtensionError::Parse(e)),
        },
        Value::Object(_) => raw.clone(),
        Value::Null => return Extension::None,
        Value::Bool(_) => return Extension::Invalid(ExtensionError::UnsupportedType("bool")),
        Value::Number(_) => return Extension::Invalid(ExtensionError::UnsupportedType("number")),
        Value::Array(_) => return Extension::Invalid(ExtensionError::UnsupportedType("array")),
    };
    if parsed.is_null() {
        return Extension::Invalid(ExtensionError::UnsupportedType("null"));
    }
    if has_actions(&parsed) {
        Extension::SuggestedActions(parsed)
    } else {
        Extension::Attachment(parsed)
    }
}

/// `actions` counts only when it is truthy: present, not null, false, zero or "".
fn has_actions(value: &Value) -> bool {
    match value.get("actions") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// One outbound bubble.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyChunk {
    pub text: String,
    pub attachments: Option<Vec<Value>>,
    pub suggested_actions: Option<Value>,
}

/// Pair chunks with the extension; only the last chunk carries it.
pub fn build_replies(chunks: Vec<String>, extension: &Extension) -> Vec<ReplyChunk> {
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let mut chunk = ReplyChunk {
                text,
                ..Default::default()
            };
            if i == last {
                match extension {
                    Extension::SuggestedActions(v) => chunk.suggested_actions = Some(v.clone()),
                    Extension::Attachment(v) => chunk.attachments = Some(vec![v.clone()]),
                    Extension::None | Extension::Invalid(_) => {}
                }
            }
            chunk
        })
        .collect()
}
