//! Speaker selection.
//!
//! A [`SelectionStrategy`] picks the agent that speaks next. The returned agent is always one of
//! the eligible agents passed in; a strategy that cannot decide fails with
//! [`ConclaveError::Selection`] instead of falling back to an arbitrary speaker.
//!
//! # Response grammar
//!
//! Model answers are free text, so [`interpret_selection`] reduces them to a
//! [`SelectionVerdict`] with fixed rules:
//!
//! 1. Surrounding whitespace, quotes, markdown emphasis and trailing punctuation are stripped.
//!    If what remains equals an eligible name (case-insensitive), that agent is chosen.
//! 2. Otherwise, if exactly one eligible name occurs in the answer as a whole word, that agent
//!    is chosen.
//! 3. Anything else is [`SelectionVerdict::NoMatch`].

use crate::agent::Agent;
use crate::backend::{invoke, ExecutionContext};
use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::error::ConclaveError;
use crate::event::ConversationEvent;
use crate::history::ChatMessage;
use crate::prompt::{render_history, render_template, DEFAULT_SELECTION_PROMPT};
use async_trait::async_trait;
use std::sync::Arc;

/// Chooses the next speaker.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    async fn select(
        &self,
        history: &[ChatMessage],
        eligible: &[Arc<Agent>],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Arc<Agent>, ConclaveError>;
}

/// Result of reading a selection answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionVerdict {
    /// Index into the eligible names.
    Agent(usize),
    NoMatch,
}

fn strip_decoration(response: &str) -> &str {
    response.trim().trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '*' | '_' | '.' | ',' | ';' | ':' | '!' | '?')
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return true;
        }
        from = start + needle.chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Map a free-text answer onto one of `eligible`.
pub fn interpret_selection(response: &str, eligible: &[&str]) -> SelectionVerdict {
    let cleaned = strip_decoration(response).to_lowercase();
    if let Some(i) = eligible
        .iter()
        .position(|name| name.to_lowercase() == cleaned)
    {
        return SelectionVerdict::Agent(i);
    }

    let lowered = response.to_lowercase();
    let mut found = eligible
        .iter()
        .enumerate()
        .filter(|(_, name)| contains_word(&lowered, &name.to_lowercase()))
        .map(|(i, _)| i);
    match (found.next(), found.next()) {
        (Some(i), None) => SelectionVerdict::Agent(i),
        _ => SelectionVerdict::NoMatch,
    }
}

fn require_eligible(eligible: &[Arc<Agent>]) -> Result<(), ConclaveError> {
    if eligible.is_empty() {
        Err(ConclaveError::Configuration(
            "no eligible agents to select from".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Asks a model which agent should speak next.
pub struct PromptSelectionStrategy {
    client: Arc<dyn ClientWrapper>,
    template: String,
    history_window: Option<usize>,
}

impl PromptSelectionStrategy {
    /// An empty `template` uses [`DEFAULT_SELECTION_PROMPT`].
    pub fn new(client: Arc<dyn ClientWrapper>, template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            client,
            template: if template.trim().is_empty() {
                DEFAULT_SELECTION_PROMPT.to_string()
            } else {
                template
            },
            history_window: None,
        }
    }

    /// Render only the last `window` messages into the prompt.
    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn render(&self, history: &[ChatMessage], eligible: &[Arc<Agent>]) -> String {
        let agents = eligible
            .iter()
            .map(|a| {
                if a.description().is_empty() {
                    format!("- {}", a.name())
                } else {
                    format!("- {}: {}", a.name(), a.description())
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let history = render_history(history, self.history_window);
        render_template(&self.template, &[("agents", &agents), ("history", &history)])
    }
}

#[async_trait]
impl SelectionStrategy for PromptSelectionStrategy {
    async fn select(
        &self,
        history: &[ChatMessage],
        eligible: &[Arc<Agent>],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Arc<Agent>, ConclaveError> {
        require_eligible(eligible)?;
        let names: Vec<&str> = eligible.iter().map(|a| a.name()).collect();

        let mut messages = vec![Message::new(Role::User, self.render(history, eligible))];
        let first = invoke(self.client.as_ref(), &messages, ctx.options, ctx.cancel).await?;
        if let SelectionVerdict::Agent(i) = interpret_selection(&first.content, &names) {
            return Ok(eligible[i].clone());
        }

        log::warn!(
            "conclave::selection: '{}' is not an eligible agent ({}), asking again",
            first.content.trim(),
            names.join(", ")
        );
        if let Some(handler) = ctx.events {
            handler
                .on_conversation_event(&ConversationEvent::SelectionRetried {
                    conversation: ctx.conversation.to_string(),
                    raw_response: first.content.to_string(),
                })
                .await;
        }

        messages.push(Message::new(Role::Assistant, &*first.content));
        messages.push(Message::new(
            Role::User,
            format!(
                "'{}' is not one of the participants. Reply with exactly one of these names and nothing else: {}",
                first.content.trim(),
                names.join(", ")
            ),
        ));
        let second = invoke(self.client.as_ref(), &messages, ctx.options, ctx.cancel).await?;
        match interpret_selection(&second.content, &names) {
            SelectionVerdict::Agent(i) => Ok(eligible[i].clone()),
            SelectionVerdict::NoMatch => Err(ConclaveError::Selection(format!(
                "model chose '{}', which is not one of: {}",
                second.content.trim(),
                names.join(", ")
            ))),
        }
    }
}

/// Round robin over the eligible agents, continuing after the last agent that spoke.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialSelectionStrategy;

impl SequentialSelectionStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SelectionStrategy for SequentialSelectionStrategy {
    async fn select(
        &self,
        history: &[ChatMessage],
        eligible: &[Arc<Agent>],
        _ctx: &ExecutionContext<'_>,
    ) -> Result<Arc<Agent>, ConclaveError> {
        require_eligible(eligible)?;
        let last = history
            .iter()
            .rev()
            .filter(|m| !m.is_from_user())
            .find_map(|m| eligible.iter().position(|a| a.name() == m.speaker));
        let next = match last {
            Some(i) => (i + 1) % eligible.len(),
            None => 0,
        };
        Ok(eligible[next].clone())
    }
}
