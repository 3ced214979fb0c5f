//! UI-agnostic conversation types
//!
//! Shared between the sync engine, the view and any front end; nothing here
//! depends on a UI framework.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A message as stored by the server. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub role: ChatRole,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Raw diagnostic payload, shown only in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}

impl Message {
    pub fn element_id(&self) -> String {
        element_id(self.id)
    }
}

/// Log element id for a server message.
pub fn element_id(id: u64) -> String {
    format!("msg-{}", id)
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    /// Anything else the server sends; rendered like an assistant message.
    #[serde(other)]
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }

    /// User text is shown verbatim; everything else goes through markdown.
    pub fn uses_markdown(&self) -> bool {
        !matches!(self, ChatRole::User)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_server_message() {
        let msg: Message = serde_json::from_value(json!({
            "id": 7,
            "role": "assistant",
            "content": "hello",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.id, 7);
        assert_eq!(msg.role, ChatRole::Assistant);
        assert_eq!(msg.element_id(), "msg-7");
        assert!(msg.debug.is_none());
    }

    #[test]
    fn unknown_role_and_null_content_are_tolerated() {
        let msg: Message = serde_json::from_value(json!({
            "id": 3,
            "role": "tool",
            "content": null
        }))
        .unwrap();
        assert_eq!(msg.role, ChatRole::System);
        assert!(msg.role.uses_markdown());
        assert_eq!(msg.content, "");
    }
}
