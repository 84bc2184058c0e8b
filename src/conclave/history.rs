//! Shared conversation history.
//!
//! A [`History`] is the single ordered record of everything said in one
//! [`Conversation`](crate::conversation::Conversation): the user's prompts, every agent reply,
//! and the intermediate tool-call and tool-result messages produced inside a turn. It is
//! append-only; entries are never edited or removed, and every entry carries its position as
//! `index`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Speaker id used for messages supplied by the caller.
pub const USER_SPEAKER: &str = "user";

/// Role of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
        };
        f.write_str(name)
    }
}

/// One entry in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Position in the history. Assigned by [`History::append`].
    pub index: usize,
    /// `"user"` for caller prompts, otherwise the name of the agent that produced the entry.
    pub speaker: String,
    pub role: MessageRole,
    /// Stored as `Arc<str>` so restricted views and transcripts clone cheaply.
    pub content: Arc<str>,
    pub timestamp: DateTime<Utc>,
    /// Free-form annotations. Tool-call entries carry the requested tool under `"tool_call"`,
    /// tool-result entries carry it under `"tool"`.
    pub metadata: HashMap<String, String>,
}

impl ChatMessage {
    /// A prompt supplied by the caller.
    pub fn user(content: impl AsRef<str>) -> Self {
        Self::new(USER_SPEAKER, MessageRole::User, content)
    }

    /// An assistant entry attributed to `agent`.
    pub fn from_agent(agent: impl Into<String>, content: impl AsRef<str>) -> Self {
        Self::new(agent, MessageRole::Assistant, content)
    }

    /// A tool result produced during `agent`'s turn.
    pub fn tool_result(agent: impl Into<String>, tool: &str, content: impl AsRef<str>) -> Self {
        Self::new(agent, MessageRole::Tool, content).with_metadata("tool", tool)
    }

    pub fn new(speaker: impl Into<String>, role: MessageRole, content: impl AsRef<str>) -> Self {
        Self {
            index: 0,
            speaker: speaker.into(),
            role,
            content: Arc::from(content.as_ref()),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `true` if the entry came from the caller rather than an agent.
    pub fn is_from_user(&self) -> bool {
        self.role == MessageRole::User && self.speaker == USER_SPEAKER
    }
}

/// Ordered, append-only sequence of [`ChatMessage`]s.
#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning it the next sequence index. Returns that index.
    pub fn append(&mut self, mut message: ChatMessage) -> usize {
        let index = self.messages.len();
        message.index = index;
        self.messages.push(message);
        index
    }

    pub fn extend<I: IntoIterator<Item = ChatMessage>>(&mut self, messages: I) {
        for message in messages {
            self.append(message);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Entries appended at or after `index`.
    pub fn since(&self, index: usize) -> &[ChatMessage] {
        let start = index.min(self.messages.len());
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The view a termination strategy is allowed to see: only messages spoken by one of
    /// `speakers`, in their original order.
    pub fn authored_by(&self, speakers: &[String]) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_from_user() && speakers.iter().any(|s| s == &m.speaker))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequential_indices() {
        let mut history = History::new();
        assert_eq!(history.append(ChatMessage::user("write a poem")), 0);
        assert_eq!(history.append(ChatMessage::from_agent("Writer", "Roses...")), 1);
        assert_eq!(history.append(ChatMessage::from_agent("Critic", "APPROVED")), 2);

        for (i, m) in history.messages().iter().enumerate() {
            assert_eq!(m.index, i);
        }
        assert_eq!(history.since(1).len(), 2);
        assert!(history.since(10).is_empty());
    }

    #[test]
    fn test_authored_by_filters_speakers() {
        let mut history = History::new();
        history.append(ChatMessage::user("Critic should approve"));
        history.append(ChatMessage::from_agent("Writer", "draft"));
        history.append(ChatMessage::tool_result("Writer", "read_file", "contents"));
        history.append(ChatMessage::from_agent("Critic", "needs work"));

        let view = history.authored_by(&["Critic".to_string()]);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].speaker, "Critic");
        assert_eq!(view[0].index, 3);
    }

    #[test]
    fn test_tool_result_metadata() {
        let msg = ChatMessage::tool_result("Writer", "write_file", "ok");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.metadata.get("tool").map(String::as_str), Some("write_file"));
        assert!(!msg.is_from_user());
    }
}
