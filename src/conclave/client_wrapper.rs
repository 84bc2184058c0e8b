use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A ClientWrapper is a wrapper around a specific LLM service.
/// It provides a common interface to interact with the model behind an agent or a strategy.
/// It does not keep track of the conversation; the [`Conversation`](crate::conversation::Conversation)
/// owns the shared history and renders it into a message list for every call.
// src/conclave/client_wrapper.rs

/// Represents the possible roles for a message sent to a model.
#[derive(Clone, Debug, PartialEq)]
pub enum Role {
    // instructions that steer the model's responses
    System,
    // a message sent by a human user, another agent, or a tool result relayed to the model
    User,
    // content the model itself generated earlier in the exchange
    Assistant,
}

impl Role {
    /// Wire name used by OpenAI-compatible chat APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: Arc<str>,
}

impl Message {
    pub fn new(role: Role, content: impl AsRef<str>) -> Self {
        Self {
            role,
            content: Arc::from(content.as_ref()),
        }
    }
}

/// Transport-level failure reported by a [`ClientWrapper`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The request never produced an HTTP response (DNS, TLS, connection reset...).
    Transport(String),
    /// The service answered with a non-success status code.
    Status { code: u16, body: String },
    /// The response body could not be decoded into a chat reply.
    Decode(String),
    /// The call exceeded its configured deadline.
    Timeout,
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    ///
    /// Authentication failures and other client errors are permanent; timeouts, connection
    /// failures, throttling and server errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) | BackendError::Timeout => true,
            BackendError::Status { code, .. } => *code == 408 || *code == 429 || *code >= 500,
            BackendError::Decode(_) => false,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Transport(msg) => write!(f, "transport failure: {}", msg),
            BackendError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            BackendError::Decode(msg) => write!(f, "malformed response: {}", msg),
            BackendError::Timeout => write!(f, "request timed out"),
        }
    }
}

impl Error for BackendError {}

/// Trait defining the interface to interact with the various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the full message list to the LLM and get the assistant reply.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError>;

    /// Model identifier this client talks to (used for logging and prompt-role decisions).
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl returns None for clients that do not track usage.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Timeout.is_transient());
        assert!(BackendError::Transport("reset".into()).is_transient());
        assert!(BackendError::Status {
            code: 503,
            body: String::new()
        }
        .is_transient());
        assert!(BackendError::Status {
            code: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!BackendError::Status {
            code: 401,
            body: "bad key".into()
        }
        .is_transient());
        assert!(!BackendError::Decode("no choices".into()).is_transient());
    }

    #[test]
    fn test_role_wire_names() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}
