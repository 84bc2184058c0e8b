//! Termination checks.
//!
//! A [`TerminationStrategy`] judges, after an allow-listed agent has spoken, whether the
//! conversation is finished. It only ever sees messages written by its allow-listed agents; the
//! [`Conversation`](crate::conversation::Conversation) filters the history before calling it.
//!
//! The verdict is a heuristic: the success marker is looked for as a case-insensitive substring
//! of a model answer (or of the last allow-listed message, for [`KeywordTerminationStrategy`]).
//! An empty answer is [`TerminationVerdict::Ambiguous`] and counts as "not done".

use crate::backend::{invoke, ExecutionContext};
use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::error::ConclaveError;
use crate::history::{ChatMessage, MessageRole};
use crate::prompt::{render_history, render_template, DEFAULT_TERMINATION_PROMPT};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationVerdict {
    Done,
    Continue,
    /// Nothing usable to judge.
    Ambiguous,
}

/// Case-insensitive substring match of `marker` in `response`.
pub fn interpret_termination(response: &str, marker: &str) -> TerminationVerdict {
    if response.trim().is_empty() || marker.trim().is_empty() {
        return TerminationVerdict::Ambiguous;
    }
    if response
        .to_lowercase()
        .contains(&marker.trim().to_lowercase())
    {
        TerminationVerdict::Done
    } else {
        TerminationVerdict::Continue
    }
}

fn require_marker(marker: &str) -> Result<String, ConclaveError> {
    let marker = marker.trim();
    if marker.is_empty() {
        Err(ConclaveError::Configuration(
            "termination success marker must not be empty".to_string(),
        ))
    } else {
        Ok(marker.to_string())
    }
}

#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    /// Agents whose messages may be read. Empty means every agent of the conversation.
    fn allowed_agents(&self) -> &[String];

    /// Judge `history`, which holds only allow-listed messages.
    async fn evaluate(
        &self,
        history: &[ChatMessage],
        ctx: &ExecutionContext<'_>,
    ) -> Result<TerminationVerdict, ConclaveError>;

    /// [`evaluate`](Self::evaluate), with an ambiguous verdict reported and treated as `false`.
    async fn is_done(
        &self,
        history: &[ChatMessage],
        ctx: &ExecutionContext<'_>,
    ) -> Result<bool, ConclaveError> {
        match self.evaluate(history, ctx).await? {
            TerminationVerdict::Done => Ok(true),
            TerminationVerdict::Continue => Ok(false),
            TerminationVerdict::Ambiguous => {
                let err = ConclaveError::TerminationAmbiguous(format!(
                    "[{}] empty termination verdict, continuing",
                    ctx.conversation
                ));
                log::warn!("conclave::termination: {}", err);
                Ok(false)
            }
        }
    }
}

/// Asks a model whether the conversation is done and looks for the success marker in its answer.
pub struct PromptTerminationStrategy {
    client: Arc<dyn ClientWrapper>,
    template: String,
    success_marker: String,
    allowed: Vec<String>,
    history_window: Option<usize>,
}

impl PromptTerminationStrategy {
    /// An empty `template` uses [`DEFAULT_TERMINATION_PROMPT`]. The marker must not be empty.
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        template: impl Into<String>,
        success_marker: &str,
    ) -> Result<Self, ConclaveError> {
        let template = template.into();
        Ok(Self {
            client,
            template: if template.trim().is_empty() {
                DEFAULT_TERMINATION_PROMPT.to_string()
            } else {
                template
            },
            success_marker: require_marker(success_marker)?,
            allowed: Vec::new(),
            history_window: None,
        })
    }

    pub fn with_allowed_agents(mut self, agents: Vec<String>) -> Self {
        self.allowed = agents;
        self
    }

    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn success_marker(&self) -> &str {
        &self.success_marker
    }
}

#[async_trait]
impl TerminationStrategy for PromptTerminationStrategy {
    fn allowed_agents(&self) -> &[String] {
        &self.allowed
    }

    async fn evaluate(
        &self,
        history: &[ChatMessage],
        ctx: &ExecutionContext<'_>,
    ) -> Result<TerminationVerdict, ConclaveError> {
        if history.is_empty() {
            return Ok(TerminationVerdict::Continue);
        }
        let prompt = render_template(
            &self.template,
            &[
                ("history", &render_history(history, self.history_window)),
                ("success", &self.success_marker),
            ],
        );
        let reply = invoke(
            self.client.as_ref(),
            &[Message::new(Role::User, prompt)],
            ctx.options,
            ctx.cancel,
        )
        .await?;
        log::debug!(
            "conclave::termination: [{}] verdict '{}'",
            ctx.conversation,
            reply.content.trim()
        );
        Ok(interpret_termination(&reply.content, &self.success_marker))
    }
}

/// Looks for the success marker in the latest allow-listed answer, without a model call.
#[derive(Debug, Clone)]
pub struct KeywordTerminationStrategy {
    success_marker: String,
    allowed: Vec<String>,
}

impl KeywordTerminationStrategy {
    pub fn new(success_marker: &str) -> Result<Self, ConclaveError> {
        Ok(Self {
            success_marker: require_marker(success_marker)?,
            allowed: Vec::new(),
        })
    }

    pub fn with_allowed_agents(mut self, agents: Vec<String>) -> Self {
        self.allowed = agents;
        self
    }
}

#[async_trait]
impl TerminationStrategy for KeywordTerminationStrategy {
    fn allowed_agents(&self) -> &[String] {
        &self.allowed
    }

    async fn evaluate(
        &self,
        history: &[ChatMessage],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<TerminationVerdict, ConclaveError> {
        let last = history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.metadata.contains_key("tool_call"));
        Ok(match last {
            Some(message) => interpret_termination(&message.content, &self.success_marker),
            None => TerminationVerdict::Continue,
        })
    }
}
