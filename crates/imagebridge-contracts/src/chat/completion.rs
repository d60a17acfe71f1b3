use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::nullable::null_as_default;

/// Typed view of a chat/completions response.
///
/// `content` and `images` stay as raw JSON because providers disagree on
/// their shape (plain string, part lists, nested `image_url` objects).
/// Explicit `null`s read like missing keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index: u32,
    #[serde(default)]
    pub message: Option<AssistantMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub images: Option<Value>,
}

impl ChatCompletion {
    pub fn first_message(&self) -> Option<&AssistantMessage> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}
