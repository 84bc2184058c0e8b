//! Conversation orchestrator.
//!
//! A [`Conversation`] owns the shared [`History`] of one group chat and drives its turn loop:
//!
//! ```text
//! execute(prompt)
//!   append user message
//!   repeat up to max_iterations:
//!     select next speaker          (SelectionStrategy)
//!     run the speaker's turn       (Agent::run_turn, including tool round-trips)
//!     append the produced messages
//!     if the speaker is allow-listed: ask the TerminationStrategy
//!     stop when it says done
//! ```
//!
//! Turns inside one conversation are strictly sequential. The history is append-only and, by
//! default, carries over between `execute` calls ([`HistoryMode::Cumulative`]); it is only cleared
//! by [`Conversation::initialize`], [`Conversation::reset`], or [`HistoryMode::Reset`].
//!
//! # States
//!
//! ```text
//! Uninitialized --initialize--> Initialized --execute--> Running --+--> Terminated
//!                                                                  +--> IterationLimitReached
//!                                                                  +--> Failed
//! ```
//!
//! Every end state accepts another `execute`. A failed run keeps the messages it produced.

use crate::agent::Agent;
use crate::agent_registry::AgentSnapshot;
use crate::backend::{ExecutionContext, ExecutionOptions};
use crate::config::HistoryMode;
use crate::error::ConclaveError;
use crate::event::{ConversationEvent, EventHandler};
use crate::history::{ChatMessage, History};
use crate::selection::SelectionStrategy;
use crate::termination::TerminationStrategy;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Characters of the prompt carried by [`ConversationEvent::ExecutionStarted`].
const PROMPT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Uninitialized,
    Initialized,
    Running,
    Terminated,
    IterationLimitReached,
    Failed,
}

/// How a successful `execute` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationOutcome {
    /// The termination strategy reported success.
    Terminated,
    /// `max_iterations` turns ran without a successful termination check.
    IterationLimitReached,
}

/// Result of one `execute` call.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// The whole conversation history after the run.
    pub messages: Vec<ChatMessage>,
    /// Index of this run's user message in `messages`.
    pub new_from: usize,
    pub outcome: ConversationOutcome,
    /// Turns taken by this run.
    pub iterations: usize,
}

impl Transcript {
    pub fn is_complete(&self) -> bool {
        self.outcome == ConversationOutcome::Terminated
    }

    /// The user message of this run and everything after it.
    pub fn new_messages(&self) -> &[ChatMessage] {
        &self.messages[self.new_from.min(self.messages.len())..]
    }

    /// Last message written by an agent, if any.
    pub fn final_answer(&self) -> Option<&ChatMessage> {
        self.new_messages().iter().rev().find(|m| !m.is_from_user())
    }
}

pub struct Conversation {
    id: String,
    name: String,
    history: History,
    agents: Vec<Arc<Agent>>,
    selection: Option<Arc<dyn SelectionStrategy>>,
    termination: Option<Arc<dyn TerminationStrategy>>,
    /// Resolved termination allow-list.
    termination_agents: Vec<String>,
    max_iterations: usize,
    iteration: usize,
    total_iterations: usize,
    is_complete: bool,
    state: ConversationState,
    options: ExecutionOptions,
    history_mode: HistoryMode,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl Conversation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            history: History::new(),
            agents: Vec::new(),
            selection: None,
            termination: None,
            termination_agents: Vec::new(),
            max_iterations: 0,
            iteration: 0,
            total_iterations: 0,
            is_complete: false,
            state: ConversationState::Uninitialized,
            options: ExecutionOptions::default(),
            history_mode: HistoryMode::default(),
            event_handler: None,
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_history_mode(mut self, mode: HistoryMode) -> Self {
        self.history_mode = mode;
        self
    }

    /// Receive conversation events and the agent events of every turn.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handler = Some(handler);
    }

    /// Bind agents, strategies and the iteration cap. Clears any existing history.
    ///
    /// Fails with [`ConclaveError::Configuration`] when `agents` is empty or has duplicate
    /// names, when `max_iterations` is zero, or when the termination allow-list names an agent
    /// that is not part of the conversation. On failure the conversation is left unchanged.
    pub fn initialize(
        &mut self,
        agents: Vec<Arc<Agent>>,
        selection: Arc<dyn SelectionStrategy>,
        termination: Arc<dyn TerminationStrategy>,
        max_iterations: usize,
    ) -> Result<(), ConclaveError> {
        if agents.is_empty() {
            return Err(ConclaveError::Configuration(format!(
                "conversation '{}' needs at least one agent",
                self.name
            )));
        }
        if max_iterations == 0 {
            return Err(ConclaveError::Configuration(format!(
                "conversation '{}': max_iterations must be at least 1",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for agent in &agents {
            if !names.insert(agent.name()) {
                return Err(ConclaveError::Configuration(format!(
                    "conversation '{}' lists agent '{}' more than once",
                    self.name,
                    agent.name()
                )));
            }
        }

        let termination_agents: Vec<String> = if termination.allowed_agents().is_empty() {
            agents.iter().map(|a| a.name().to_string()).collect()
        } else {
            if let Some(unknown) = termination
                .allowed_agents()
                .iter()
                .find(|n| !names.contains(n.as_str()))
            {
                return Err(ConclaveError::Configuration(format!(
                    "conversation '{}': termination agent '{}' is not a participant",
                    self.name, unknown
                )));
            }
            termination.allowed_agents().to_vec()
        };

        self.agents = agents;
        self.selection = Some(selection);
        self.termination = Some(termination);
        self.termination_agents = termination_agents;
        self.max_iterations = max_iterations;
        self.history = History::new();
        self.iteration = 0;
        self.is_complete = false;
        self.state = ConversationState::Initialized;

        log::info!(
            "conclave::conversation: '{}' initialized with {} agent(s), max {} iteration(s)",
            self.name,
            self.agents.len(),
            self.max_iterations
        );
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        self.history.messages()
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn termination_agents(&self) -> &[String] {
        &self.termination_agents
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Turns taken by the current (or last) `execute`.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Turns taken over the lifetime of the conversation.
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn history_mode(&self) -> HistoryMode {
        self.history_mode
    }

    /// Swap each participant for the entry of the same name in `snapshot`.
    ///
    /// Participants missing from the snapshot are kept, so the agent set and the termination
    /// allow-list never change shape between runs.
    pub fn rebind_agents(&mut self, snapshot: &AgentSnapshot) {
        for agent in &mut self.agents {
            match snapshot.get(agent.name()) {
                Some(current) if !Arc::ptr_eq(&current, agent) => {
                    log::debug!(
                        "conclave::conversation: '{}' picked up a new definition of '{}'",
                        self.name,
                        agent.name()
                    );
                    *agent = current;
                }
                Some(_) => {}
                None => log::warn!(
                    "conclave::conversation: '{}' keeps agent '{}', which is no longer registered",
                    self.name,
                    agent.name()
                ),
            }
        }
    }

    /// Drop the history and counters, keeping agents and strategies.
    pub fn reset(&mut self) {
        self.history = History::new();
        self.iteration = 0;
        self.is_complete = false;
        if self.state != ConversationState::Uninitialized {
            self.state = ConversationState::Initialized;
        }
        log::debug!("conclave::conversation: '{}' reset", self.name);
    }

    async fn emit(&self, event: ConversationEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_conversation_event(&event).await;
        }
    }

    /// Append `prompt` and run turns until the termination check succeeds or `max_iterations`
    /// turns have been taken.
    ///
    /// Errors abort the run immediately. Messages appended before the failure stay in the
    /// history and the conversation remains usable.
    pub async fn execute(
        &mut self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Transcript, ConclaveError> {
        let (selection, termination) = match (&self.selection, &self.termination) {
            (Some(s), Some(t)) if self.state != ConversationState::Uninitialized => {
                (s.clone(), t.clone())
            }
            _ => return Err(ConclaveError::NotInitialized(self.name.clone())),
        };

        if self.history_mode == HistoryMode::Reset {
            self.history = History::new();
        }
        self.iteration = 0;
        self.is_complete = false;
        self.state = ConversationState::Running;

        let new_from = self.history.append(ChatMessage::user(prompt));
        self.emit(ConversationEvent::ExecutionStarted {
            conversation: self.name.clone(),
            prompt_preview: prompt.chars().take(PROMPT_PREVIEW_CHARS).collect(),
            history_len: self.history.len(),
        })
        .await;

        match self
            .run_loop(selection.as_ref(), termination.as_ref(), cancel)
            .await
        {
            Ok(outcome) => {
                self.state = match outcome {
                    ConversationOutcome::Terminated => ConversationState::Terminated,
                    ConversationOutcome::IterationLimitReached => {
                        ConversationState::IterationLimitReached
                    }
                };
                self.log_transcript();
                self.emit(ConversationEvent::ExecutionCompleted {
                    conversation: self.name.clone(),
                    terminated: outcome == ConversationOutcome::Terminated,
                    iterations: self.iteration,
                })
                .await;
                Ok(Transcript {
                    messages: self.history.messages().to_vec(),
                    new_from,
                    outcome,
                    iterations: self.iteration,
                })
            }
            Err(err) => {
                self.state = ConversationState::Failed;
                log::error!(
                    "conclave::conversation: '{}' failed after {} iteration(s): {}",
                    self.name,
                    self.iteration,
                    err
                );
                self.emit(ConversationEvent::ExecutionFailed {
                    conversation: self.name.clone(),
                    error: err.to_string(),
                    iterations: self.iteration,
                })
                .await;
                Err(err)
            }
        }
    }

    async fn run_loop(
        &mut self,
        selection: &dyn SelectionStrategy,
        termination: &dyn TerminationStrategy,
        cancel: &CancellationToken,
    ) -> Result<ConversationOutcome, ConclaveError> {
        let ctx = ExecutionContext {
            conversation: &self.name,
            options: &self.options,
            cancel,
            events: self.event_handler.as_ref(),
        };

        while self.iteration < self.max_iterations {
            if cancel.is_cancelled() {
                return Err(ConclaveError::Cancelled);
            }
            self.iteration += 1;
            self.total_iterations += 1;

            let agent = selection
                .select(self.history.messages(), &self.agents, &ctx)
                .await?;
            log::debug!(
                "conclave::conversation: '{}' iteration {}/{}: {}",
                ctx.conversation,
                self.iteration,
                self.max_iterations,
                agent.name()
            );
            if let Some(handler) = ctx.events {
                handler
                    .on_conversation_event(&ConversationEvent::AgentSelected {
                        conversation: ctx.conversation.to_string(),
                        agent_name: agent.name().to_string(),
                        iteration: self.iteration,
                    })
                    .await;
            }

            let produced = agent.run_turn(self.history.messages(), &ctx).await?;
            let produced_count = produced.len();
            self.history.extend(produced);
            if let Some(handler) = ctx.events {
                handler
                    .on_conversation_event(&ConversationEvent::TurnAppended {
                        conversation: ctx.conversation.to_string(),
                        agent_name: agent.name().to_string(),
                        iteration: self.iteration,
                        messages: produced_count,
                    })
                    .await;
            }

            if !self.termination_agents.iter().any(|n| n == agent.name()) {
                continue;
            }
            let restricted = self.history.authored_by(&self.termination_agents);
            let done = termination.is_done(&restricted, &ctx).await?;
            if let Some(handler) = ctx.events {
                handler
                    .on_conversation_event(&ConversationEvent::TerminationChecked {
                        conversation: ctx.conversation.to_string(),
                        iteration: self.iteration,
                        done,
                    })
                    .await;
            }
            if done {
                self.is_complete = true;
                return Ok(ConversationOutcome::Terminated);
            }
        }

        Ok(ConversationOutcome::IterationLimitReached)
    }

    fn log_transcript(&self) {
        for message in self.history.messages() {
            log::info!(
                "# {} - {}: '{}'",
                message.role,
                message.speaker,
                message.content
            );
        }
        log::info!("# IS COMPLETE: {}", self.is_complete);
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("agents", &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("history_len", &self.history.len())
            .field("iteration", &self.iteration)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::{BackendError, ClientWrapper, Message, Role};
    use crate::selection::SequentialSelectionStrategy;
    use crate::termination::KeywordTerminationStrategy;
    use async_trait::async_trait;

    struct Echo(&'static str);

    #[async_trait]
    impl ClientWrapper for Echo {
        async fn send_message(&self, _messages: &[Message]) -> Result<Message, BackendError> {
            Ok(Message::new(Role::Assistant, self.0))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn agent(name: &str, reply: &'static str) -> Arc<Agent> {
        Arc::new(Agent::new(name, "", Arc::new(Echo(reply))))
    }

    fn keyword(allowed: &[&str]) -> Arc<dyn TerminationStrategy> {
        Arc::new(
            KeywordTerminationStrategy::new("APPROVED")
                .unwrap()
                .with_allowed_agents(allowed.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[test]
    fn test_initialize_validation() {
        let mut conversation = Conversation::new("review");
        let sequential = Arc::new(SequentialSelectionStrategy::new());

        let err = conversation
            .initialize(Vec::new(), sequential.clone(), keyword(&[]), 10)
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Configuration(_)));

        let err = conversation
            .initialize(vec![agent("Writer", "x")], sequential.clone(), keyword(&[]), 0)
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Configuration(_)));

        let err = conversation
            .initialize(
                vec![agent("Writer", "x")],
                sequential.clone(),
                keyword(&["Critic"]),
                10,
            )
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Configuration(_)));
        assert_eq!(conversation.state(), ConversationState::Uninitialized);

        conversation
            .initialize(vec![agent("Writer", "x")], sequential, keyword(&[]), 10)
            .unwrap();
        assert_eq!(conversation.state(), ConversationState::Initialized);
        assert_eq!(conversation.termination_agents(), &["Writer".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_requires_initialize() {
        let mut conversation = Conversation::new("review");
        let err = conversation
            .execute("hello", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ConclaveError::NotInitialized("review".to_string()));
        assert!(conversation.history().is_empty());
    }

    #[tokio::test]
    async fn test_termination_ignores_other_speakers() {
        let mut conversation = Conversation::new("review");
        conversation
            .initialize(
                vec![agent("Writer", "APPROVED draft"), agent("Critic", "needs work")],
                Arc::new(SequentialSelectionStrategy::new()),
                keyword(&["Critic"]),
                4,
            )
            .unwrap();

        let transcript = conversation
            .execute("write", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(transcript.outcome, ConversationOutcome::IterationLimitReached);
        assert_eq!(transcript.iterations, 4);
        assert_eq!(transcript.messages.len(), 5);
        assert_eq!(conversation.state(), ConversationState::IterationLimitReached);
    }
}
