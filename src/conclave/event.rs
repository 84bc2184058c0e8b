//! Progress notifications for agent turns and conversation runs.
//!
//! An [`EventHandler`] sees every model round-trip, tool call and tool limit inside a turn, plus
//! the conversation-level steps around it: start, speaker choice, termination checks, the end
//! of a run. Handlers are shared as `Arc<dyn EventHandler>`. One set on a
//! [`Conversation`](crate::conversation::Conversation) also receives the agent events of the
//! turns it drives. Nothing is emitted when no handler is registered.
//!
//! # Example
//!
//! ```rust,no_run
//! use conclave::event::{AgentEvent, ConversationEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_agent_event(&self, event: &AgentEvent) {
//!         if let AgentEvent::ToolCallDetected { agent_name, tool_name, .. } = event {
//!             println!("{} is calling {}", agent_name, tool_name);
//!         }
//!     }
//!     async fn on_conversation_event(&self, event: &ConversationEvent) {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

use crate::client_wrapper::TokenUsage;
use async_trait::async_trait;

/// Events emitted while an [`Agent`](crate::agent::Agent) runs a turn.
///
/// ```text
/// TurnStarted
///   └─ BackendCallStarted { iteration: 1 }
///   └─ BackendCallCompleted { iteration: 1 }
///   └─ (if the reply is a tool call)
///       ├─ ToolCallDetected { iteration: 1 }
///       ├─ ToolExecutionCompleted { iteration: 1 }
///       ├─ BackendCallStarted { iteration: 2 }
///       └─ BackendCallCompleted { iteration: 2 }
///   └─ (until a final answer, or ToolCallLimitReached)
/// TurnCompleted
/// ```
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TurnStarted {
        agent_name: String,
        /// Number of history entries the agent was shown.
        history_len: usize,
    },
    BackendCallStarted {
        agent_name: String,
        /// 1-based model call counter within the turn.
        iteration: usize,
    },
    BackendCallCompleted {
        agent_name: String,
        iteration: usize,
        /// Usage reported by the backend for this call, if any.
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },
    ToolCallDetected {
        agent_name: String,
        tool_name: String,
        parameters: serde_json::Value,
        /// 1-based tool call counter within the turn.
        iteration: usize,
    },
    ToolExecutionCompleted {
        agent_name: String,
        tool_name: String,
        success: bool,
        iteration: usize,
    },
    /// The model asked for another tool after the per-turn limit was used up.
    ToolCallLimitReached {
        agent_name: String,
        limit: usize,
    },
    TurnCompleted {
        agent_name: String,
        /// Messages the turn appended (tool calls, tool results and the final answer).
        messages_produced: usize,
        tool_calls_made: usize,
    },
}

/// Events emitted by a [`Conversation`](crate::conversation::Conversation) while it executes.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    ExecutionStarted {
        conversation: String,
        /// First ~120 characters of the prompt.
        prompt_preview: String,
        history_len: usize,
    },
    AgentSelected {
        conversation: String,
        agent_name: String,
        iteration: usize,
    },
    /// The selection model answered with something that is not an eligible agent.
    SelectionRetried {
        conversation: String,
        raw_response: String,
    },
    TurnAppended {
        conversation: String,
        agent_name: String,
        iteration: usize,
        messages: usize,
    },
    TerminationChecked {
        conversation: String,
        iteration: usize,
        done: bool,
    },
    ExecutionCompleted {
        conversation: String,
        /// `true` when the termination strategy ended the run, `false` at the iteration limit.
        terminated: bool,
        iterations: usize,
    },
    ExecutionFailed {
        conversation: String,
        error: String,
        iterations: usize,
    },
}

/// Receives [`AgentEvent`]s and [`ConversationEvent`]s. Both methods default to no-ops.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_agent_event(&self, _event: &AgentEvent) {}

    async fn on_conversation_event(&self, _event: &ConversationEvent) {}
}

/// Writes every event to the `log` facade.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_agent_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::ToolCallDetected {
                agent_name,
                tool_name,
                iteration,
                ..
            } => log::info!("{} -> tool '{}' (call {})", agent_name, tool_name, iteration),
            AgentEvent::ToolCallLimitReached { agent_name, limit } => {
                log::warn!("{} reached the limit of {} tool calls", agent_name, limit)
            }
            other => log::debug!("{:?}", other),
        }
    }

    async fn on_conversation_event(&self, event: &ConversationEvent) {
        match event {
            ConversationEvent::AgentSelected {
                conversation,
                agent_name,
                iteration,
            } => log::info!("[{}] iteration {}: {}", conversation, iteration, agent_name),
            ConversationEvent::ExecutionFailed {
                conversation,
                error,
                ..
            } => log::error!("[{}] execution failed: {}", conversation, error),
            other => log::debug!("{:?}", other),
        }
    }
}
