use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::content::ContentPart;
use crate::types::role::Role;

/// A single message in a conversation.
///
/// Identity is positional: a message is identified by where it sits in the
/// conversation, not by any id field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Optional participant name, for providers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// For `Role::Tool` messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// A message with an explicit role and content parts.
    #[must_use]
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_call_id: None,
        }
    }

    /// A system message with a single text part.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentPart::text(text)])
    }

    /// A user message with a single text part.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::text(text)])
    }

    /// An assistant message with a single text part.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::text(text)])
    }

    /// A developer message with a single text part.
    #[must_use]
    pub fn developer(text: impl Into<String>) -> Self {
        Self::new(Role::Developer, vec![ContentPart::text(text)])
    }

    /// A tool-role message answering `tool_call_id` with structured content.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        let id = tool_call_id.into();
        let mut msg = Self::new(
            Role::Tool,
            vec![ContentPart::tool_result(id.clone(), content, is_error)],
        );
        msg.tool_call_id = Some(id);
        msg
    }

    /// A tool-role message answering `tool_call_id` with plain text.
    #[must_use]
    pub fn tool_result_text(
        tool_call_id: impl Into<String>,
        text: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::tool_result(tool_call_id, Value::String(text.into()), is_error)
    }

    /// Concatenation of all text parts, skipping every other kind.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_and_skips_non_text() {
        let msg = Message::new(
            Role::Assistant,
            vec![
                ContentPart::text("Hello"),
                ContentPart::image_url("https://example.com/a.png"),
                ContentPart::text(" there"),
            ],
        );
        assert_eq!(msg.text(), "Hello there");
    }

    #[test]
    fn tool_result_sets_role_and_call_id() {
        let msg = Message::tool_result_text("call_9", "ok", false);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
    }
}
