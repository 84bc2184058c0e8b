//! # Conclave
//!
//! Conclave runs group conversations between several independently configured agents, each
//! backed by its own language model, to work on a task supplied by the user.
//!
//! The crate is organised around a small number of pieces:
//!
//! * **Agents**: [`Agent`] pairs a name, description and instructions with a model client and
//!   the tools it may call. Agents are built once and shared by every conversation through the
//!   [`agent_registry::AgentRegistry`].
//! * **Strategies**: a [`selection::SelectionStrategy`] picks who speaks next and a
//!   [`termination::TerminationStrategy`] decides when the group is done. Both ship in a
//!   model-driven and a deterministic flavour.
//! * **Conversations**: [`Conversation`] owns the shared, append-only history and drives the turn
//!   loop up to a fixed iteration cap.
//! * **Scenarios**: [`ScenarioRegistry`] maps scenario names from the configuration file onto
//!   ready-to-run conversations.
//! * **Backends**: [`client_wrapper::ClientWrapper`] is implemented for OpenAI, Azure OpenAI,
//!   Ollama and Gemini. Every call goes through [`backend::invoke`], which adds a deadline, a
//!   retry policy for transient failures, and cancellation.
//!
//! ## Running a scenario
//!
//! ```rust,no_run
//! use conclave::backend::HttpClientFactory;
//! use conclave::config::ConclaveConfig;
//! use conclave::ScenarioRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     conclave::init_logger();
//!
//!     let config = ConclaveConfig::load("appsettings.json")?;
//!     let clients = HttpClientFactory::new(config.backends.clone());
//!     let scenarios = ScenarioRegistry::from_config(&config, &clients)?;
//!
//!     let transcript = scenarios
//!         .execute("Review", "Write a two-line slogan for a neighbourhood bakery.")
//!         .await?;
//!     for message in transcript.new_messages() {
//!         println!("[{}] {}", message.speaker, message.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Building a conversation by hand
//!
//! ```rust,no_run
//! use conclave::clients::openai::OpenAIClient;
//! use conclave::selection::SequentialSelectionStrategy;
//! use conclave::termination::KeywordTerminationStrategy;
//! use conclave::{Agent, Conversation};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async {
//! let client = Arc::new(OpenAIClient::new_with_model_string("sk-...", "gpt-4o-mini"));
//! let writer = Arc::new(
//!     Agent::new("Writer", "Drafts copy", client.clone())
//!         .with_instructions("Write or revise the draft."),
//! );
//! let critic = Arc::new(
//!     Agent::new("Critic", "Reviews drafts", client)
//!         .with_instructions("Review the latest draft. Say APPROVED when it is good."),
//! );
//!
//! let mut conversation = Conversation::new("review");
//! conversation.initialize(
//!     vec![writer, critic],
//!     Arc::new(SequentialSelectionStrategy::new()),
//!     Arc::new(
//!         KeywordTerminationStrategy::new("APPROVED")?.with_allowed_agents(vec!["Critic".into()]),
//!     ),
//!     10,
//! )?;
//! let transcript = conversation
//!     .execute("Slogan for a bakery", &CancellationToken::new())
//!     .await?;
//! println!("complete: {}", transcript.is_complete());
//! # Ok::<(), conclave::error::ConclaveError>(())
//! # };
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Verbosity follows `RUST_LOG`, e.g. `RUST_LOG=conclave=debug`.
///
/// ```rust
/// conclave::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

pub mod conclave;

// Re-exporting key items for easier external access.
pub use conclave::{
    agent, agent_registry, backend, client_wrapper, clients, config, conversation, error, event,
    history, prompt, scenario, selection, termination, tool_protocol, tool_provider, tools,
};
pub use conclave::{Agent, Conversation, ScenarioRegistry, Transcript};
pub use conclave::client_wrapper::{ClientWrapper, Message, Role};
pub use conclave::error::ConclaveError;
pub use conclave::event::{AgentEvent, ConversationEvent, EventHandler};
