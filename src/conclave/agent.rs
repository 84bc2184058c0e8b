//! Agent System
//!
//! An [`Agent`] is one configured participant of a group conversation: a unique name, a
//! description used by the speaker-selection prompt, system instructions, the model client it
//! is bound to, and the tools it may call.
//!
//! Agents are immutable once built and shared as `Arc<Agent>` between every conversation that
//! uses them. They hold no per-conversation state: each turn receives the shared history from
//! the [`Conversation`](crate::conversation::Conversation) and returns the messages it produced.
//!
//! # Turn execution
//!
//! [`Agent::run_turn`] renders instructions + history into a message list and calls the model.
//! When the reply is a tool call (`{"tool_call": {"name": ..., "parameters": {...}}}`) the tool
//! runs, the call and its textual result are recorded as intermediate messages, and the model is
//! asked again. The loop stops at the first plain answer or once
//! [`ExecutionOptions::max_tool_calls_per_turn`](crate::backend::ExecutionOptions::max_tool_calls_per_turn)
//! tool calls have been made.
//!
//! ```rust,no_run
//! use conclave::agent::Agent;
//! use conclave::clients::openai::OpenAIClient;
//! use std::sync::Arc;
//!
//! let critic = Agent::new(
//!     "Critic",
//!     "Reviews drafts and approves them",
//!     Arc::new(OpenAIClient::new_with_model_string("sk-...", "gpt-4o-mini")),
//! )
//! .with_instructions("Review the latest draft. Reply APPROVED when it is ready to ship.");
//! ```

use crate::backend::{invoke, BackendKind, BackendReply, ExecutionContext};
use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::error::ConclaveError;
use crate::event::AgentEvent;
use crate::history::{ChatMessage, MessageRole};
use crate::tool_protocol::{ToolProtocol, ToolRegistry};
use std::sync::Arc;

/// Models that reject the system role and take their instructions as a user message.
const USER_ROLE_INSTRUCTION_MODELS: [&str; 2] = ["o1-mini", "o3-mini"];

/// A conversational participant bound to one model backend and an optional set of tools.
pub struct Agent {
    name: String,
    description: String,
    instructions: String,
    backend: Option<BackendKind>,
    client: Arc<dyn ClientWrapper>,
    tools: ToolRegistry,
    declared_tools: Vec<String>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: String::new(),
            backend: None,
            client,
            tools: ToolRegistry::new(),
            declared_tools: Vec::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Record which backend kind the client talks to.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Expose every tool served by `protocol`, under the configured tool name `declared_as`.
    pub fn with_tool_protocol(
        mut self,
        declared_as: impl Into<String>,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Self {
        self.declared_tools.push(declared_as.into());
        self.tools.add_protocol(protocol);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Configured tool names this agent was granted.
    pub fn declared_tools(&self) -> &[String] {
        &self.declared_tools
    }

    /// Role used for the instructions message (some reasoning models reject `system`).
    pub fn instruction_role(&self) -> Role {
        let model = self.client.model_name().to_lowercase();
        if USER_ROLE_INSTRUCTION_MODELS
            .iter()
            .any(|m| model.starts_with(m))
        {
            Role::User
        } else {
            Role::System
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.\n", self.name);
        if !self.description.is_empty() {
            prompt.push_str(&format!("Your role: {}\n", self.description));
        }
        if !self.instructions.is_empty() {
            prompt.push('\n');
            prompt.push_str(&self.instructions);
            prompt.push('\n');
        }

        let tools = self.tools.list_tools();
        if !tools.is_empty() {
            prompt.push_str("\nYou have access to the following tools:\n");
            for tool in tools {
                prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
                if !tool.parameters.is_empty() {
                    prompt.push_str("  Parameters:\n");
                    for param in &tool.parameters {
                        let description = if param.description.is_empty() {
                            "No description"
                        } else {
                            param.description.as_str()
                        };
                        prompt.push_str(&format!(
                            "    - {} ({}{}): {}\n",
                            param.name,
                            param.kind.as_str(),
                            if param.required { ", required" } else { "" },
                            description
                        ));
                    }
                }
            }
            prompt.push_str(
                "\nTo use a tool, respond with only a JSON object in the following format:\n\
                 {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                 After tool execution, I'll provide the result and you can continue.\n",
            );
        }
        prompt
    }

    /// Render instructions plus the shared history into the message list sent to the model.
    ///
    /// The agent's own replies are `assistant` messages; everything else (the user, other
    /// agents, tool results) arrives as `user` messages prefixed with the speaker's name.
    pub fn build_messages(&self, history: &[ChatMessage]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::new(self.instruction_role(), self.system_prompt()));

        for entry in history {
            let own = entry.speaker == self.name;
            let message = match entry.role {
                MessageRole::System => Message::new(Role::System, &*entry.content),
                MessageRole::User => Message::new(Role::User, &*entry.content),
                MessageRole::Assistant if own => Message::new(Role::Assistant, &*entry.content),
                MessageRole::Assistant => Message::new(
                    Role::User,
                    format!("{}: {}", entry.speaker, entry.content),
                ),
                MessageRole::Tool if own => Message::new(Role::User, &*entry.content),
                MessageRole::Tool => Message::new(
                    Role::User,
                    format!("{} (tool result): {}", entry.speaker, entry.content),
                ),
            };
            messages.push(message);
        }
        messages
    }

    async fn emit(&self, ctx: &ExecutionContext<'_>, event: AgentEvent) {
        if let Some(handler) = ctx.events {
            handler.on_agent_event(&event).await;
        }
    }

    /// Run one turn against `history` and return the messages it produced, in order.
    ///
    /// Tool failures are returned to the model as text and never abort the turn. Backend
    /// failures and cancellation do.
    pub async fn run_turn(
        &self,
        history: &[ChatMessage],
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<ChatMessage>, ConclaveError> {
        self.emit(
            ctx,
            AgentEvent::TurnStarted {
                agent_name: self.name.clone(),
                history_len: history.len(),
            },
        )
        .await;

        let mut working = self.build_messages(history);
        let mut produced = Vec::new();
        let tools_declared = !self.tools.is_empty();
        let limit = ctx.options.max_tool_calls_per_turn;
        let mut tool_calls = 0;
        let mut iteration = 0;

        loop {
            iteration += 1;
            self.emit(
                ctx,
                AgentEvent::BackendCallStarted {
                    agent_name: self.name.clone(),
                    iteration,
                },
            )
            .await;

            let reply = invoke(self.client.as_ref(), &working, ctx.options, ctx.cancel).await?;
            let text = reply.content.to_string();

            self.emit(
                ctx,
                AgentEvent::BackendCallCompleted {
                    agent_name: self.name.clone(),
                    iteration,
                    tokens_used: self.client.get_last_usage().await,
                    response_length: text.len(),
                },
            )
            .await;

            let (request, raw) = match BackendReply::from_text(text, tools_declared) {
                BackendReply::Text(answer) => {
                    produced.push(ChatMessage::from_agent(self.name.as_str(), answer));
                    break;
                }
                BackendReply::ToolCall { request, raw } => (request, raw),
            };

            if tool_calls >= limit {
                log::warn!(
                    "conclave::agent: {} exceeded {} tool calls in one turn",
                    self.name,
                    limit
                );
                self.emit(
                    ctx,
                    AgentEvent::ToolCallLimitReached {
                        agent_name: self.name.clone(),
                        limit,
                    },
                )
                .await;
                produced.push(
                    ChatMessage::from_agent(
                        self.name.as_str(),
                        format!("{}\n\n[Warning: Maximum tool calls per turn reached]", raw),
                    )
                    .with_metadata("tool_limit_reached", "true"),
                );
                break;
            }

            tool_calls += 1;
            self.emit(
                ctx,
                AgentEvent::ToolCallDetected {
                    agent_name: self.name.clone(),
                    tool_name: request.name.clone(),
                    parameters: request.parameters.clone(),
                    iteration: tool_calls,
                },
            )
            .await;

            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(ConclaveError::Cancelled),
                outcome = self.tools.execute_tool(&request.name, request.parameters.clone()) => outcome,
            };
            if let Some(err) = outcome.as_error() {
                log::warn!(
                    "conclave::agent: {}: {} (returned to the model)",
                    self.name,
                    err
                );
            }

            self.emit(
                ctx,
                AgentEvent::ToolExecutionCompleted {
                    agent_name: self.name.clone(),
                    tool_name: request.name.clone(),
                    success: outcome.is_success(),
                    iteration: tool_calls,
                },
            )
            .await;

            working.push(Message::new(Role::Assistant, &raw));
            working.push(Message::new(Role::User, outcome.text()));
            produced.push(
                ChatMessage::from_agent(self.name.as_str(), raw)
                    .with_metadata("tool_call", request.name.as_str()),
            );
            produced.push(ChatMessage::tool_result(
                self.name.as_str(),
                &request.name,
                outcome.text(),
            ));
        }

        self.emit(
            ctx,
            AgentEvent::TurnCompleted {
                agent_name: self.name.clone(),
                messages_produced: produced.len(),
                tool_calls_made: tool_calls,
            },
        )
        .await;

        Ok(produced)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("backend", &self.backend)
            .field("model", &self.client.model_name())
            .field("declared_tools", &self.declared_tools)
            .finish()
    }
}
