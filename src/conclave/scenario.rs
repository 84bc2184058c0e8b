//! Scenario registry: named, preconfigured conversations.
//!
//! Each enabled entry of the `scenarios` configuration section becomes one [`Conversation`],
//! built once at startup and kept for the life of the registry. Different scenarios execute
//! concurrently; executions of the same scenario wait for each other, since they share one
//! history.
//!
//! ```rust,no_run
//! use conclave::backend::HttpClientFactory;
//! use conclave::config::ConclaveConfig;
//! use conclave::scenario::ScenarioRegistry;
//!
//! # async {
//! let config = ConclaveConfig::load("appsettings.json")?;
//! let clients = HttpClientFactory::new(config.backends.clone());
//! let scenarios = ScenarioRegistry::from_config(&config, &clients)?;
//!
//! for name in scenarios.list_scenarios() {
//!     println!("{}", name);
//! }
//! let transcript = scenarios.execute("Review", "Write a slogan for a bakery").await?;
//! println!("complete: {}", transcript.is_complete());
//! # Ok::<(), conclave::error::ConclaveError>(())
//! # };
//! ```

use crate::agent_registry::{AgentRegistry, AgentSnapshot};
use crate::backend::{BackendKind, ClientFactory, ExecutionOptions};
use crate::client_wrapper::ClientWrapper;
use crate::config::{ConclaveConfig, ScenarioSettings, SelectionMode};
use crate::conversation::{Conversation, ConversationState, Transcript};
use crate::error::ConclaveError;
use crate::event::EventHandler;
use crate::history::ChatMessage;
use crate::selection::{PromptSelectionStrategy, SelectionStrategy, SequentialSelectionStrategy};
use crate::termination::{
    KeywordTerminationStrategy, PromptTerminationStrategy, TerminationStrategy,
};
use crate::tool_provider::ToolFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct Scenario {
    name: String,
    description: String,
    conversation: Mutex<Conversation>,
}

/// Enabled scenarios, in configuration order, and the agents they draw from.
///
/// Updates made through [`agents`](ScenarioRegistry::agents) take effect at the start of the
/// next `execute` of each scenario. A run already in progress keeps the agents it started with.
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
    index: HashMap<String, usize>,
    agents: Arc<AgentRegistry>,
}

impl ScenarioRegistry {
    /// Build the tool provider, the agent registry and every enabled scenario from `config`.
    pub fn from_config(
        config: &ConclaveConfig,
        clients: &dyn ClientFactory,
    ) -> Result<Self, ConclaveError> {
        let tools = ToolFactory::from_settings(&config.tools);
        let agents = AgentRegistry::from_settings(&config.agents, clients, &tools)?;
        Self::initialize(
            &config.scenarios,
            Arc::new(agents),
            clients,
            config.execution.to_options(),
        )
    }

    /// Build one conversation per enabled scenario.
    ///
    /// Any invalid scenario (no agents, an agent missing from `agents`, an unknown strategy
    /// backend, a duplicate name) fails the whole registry with
    /// [`ConclaveError::Configuration`].
    pub fn initialize(
        settings: &[ScenarioSettings],
        agents: Arc<AgentRegistry>,
        clients: &dyn ClientFactory,
        options: ExecutionOptions,
    ) -> Result<Self, ConclaveError> {
        let snapshot = agents.snapshot();
        let mut registry = Self {
            scenarios: Vec::new(),
            index: HashMap::new(),
            agents,
        };

        for scenario in settings {
            if !scenario.enabled {
                log::warn!(
                    "conclave::scenario: scenario '{}' is disabled and was skipped",
                    scenario.name
                );
                continue;
            }
            if scenario.name.trim().is_empty() {
                return Err(ConclaveError::Configuration(
                    "scenario name must not be empty".to_string(),
                ));
            }
            if registry.index.contains_key(&scenario.name) {
                return Err(ConclaveError::Configuration(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }

            let conversation = build_conversation(scenario, &snapshot, clients, &options)?;
            registry
                .index
                .insert(scenario.name.clone(), registry.scenarios.len());
            registry.scenarios.push(Scenario {
                name: scenario.name.clone(),
                description: scenario.description.clone(),
                conversation: Mutex::new(conversation),
            });
        }

        log::info!(
            "conclave::scenario: {} scenario(s) ready",
            registry.scenarios.len()
        );
        Ok(registry)
    }

    /// Route conversation and agent events of every scenario to `handler`.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        for scenario in &mut self.scenarios {
            scenario
                .conversation
                .get_mut()
                .set_event_handler(handler.clone());
        }
        self
    }

    /// The agent registry backing every scenario.
    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    /// Names of the enabled scenarios, in configuration order.
    pub fn list_scenarios(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .map(|&i| self.scenarios[i].description.as_str())
    }

    fn find(&self, name: &str) -> Result<&Scenario, ConclaveError> {
        self.index
            .get(name)
            .map(|&i| &self.scenarios[i])
            .ok_or_else(|| ConclaveError::ScenarioNotFound(name.to_string()))
    }

    /// Run `prompt` through the named scenario.
    pub async fn execute(&self, name: &str, prompt: &str) -> Result<Transcript, ConclaveError> {
        self.execute_with_cancellation(name, prompt, &CancellationToken::new())
            .await
    }

    /// [`execute`](Self::execute), aborting with [`ConclaveError::Cancelled`] once `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        name: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Transcript, ConclaveError> {
        let scenario = self.find(name)?;
        let mut conversation = scenario.conversation.lock().await;
        conversation.rebind_agents(&self.agents.snapshot());
        log::info!("conclave::scenario: executing '{}'", name);
        conversation.execute(prompt, cancel).await
    }

    /// A copy of the named scenario's current history.
    pub async fn history(&self, name: &str) -> Result<Vec<ChatMessage>, ConclaveError> {
        let scenario = self.find(name)?;
        let conversation = scenario.conversation.lock().await;
        Ok(conversation.history().to_vec())
    }

    pub async fn state(&self, name: &str) -> Result<ConversationState, ConclaveError> {
        let scenario = self.find(name)?;
        let conversation = scenario.conversation.lock().await;
        Ok(conversation.state())
    }

    /// Clear the named scenario's history.
    pub async fn reset(&self, name: &str) -> Result<(), ConclaveError> {
        let scenario = self.find(name)?;
        scenario.conversation.lock().await.reset();
        Ok(())
    }
}

fn strategy_client(
    settings: &ScenarioSettings,
    clients: &dyn ClientFactory,
) -> Result<Arc<dyn ClientWrapper>, ConclaveError> {
    let kind: BackendKind = settings.backend.parse().map_err(|e| match e {
        ConclaveError::Configuration(msg) => {
            ConclaveError::Configuration(format!("scenario '{}': {}", settings.name, msg))
        }
        other => other,
    })?;
    clients.create_client(kind, &settings.model)
}

fn build_conversation(
    settings: &ScenarioSettings,
    snapshot: &AgentSnapshot,
    clients: &dyn ClientFactory,
    options: &ExecutionOptions,
) -> Result<Conversation, ConclaveError> {
    if settings.agents.is_empty() {
        return Err(ConclaveError::Configuration(format!(
            "scenario '{}' has no agents",
            settings.name
        )));
    }
    let agents = settings
        .agents
        .iter()
        .map(|name| {
            snapshot.get(name).ok_or_else(|| {
                ConclaveError::Configuration(format!(
                    "scenario '{}' references unknown agent '{}'",
                    settings.name, name
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let needs_model = settings.selection == SelectionMode::Prompt
        || !settings.termination_prompt.trim().is_empty();
    let client = if needs_model {
        Some(strategy_client(settings, clients)?)
    } else {
        None
    };

    let selection: Arc<dyn SelectionStrategy> = match (&settings.selection, &client) {
        (SelectionMode::Prompt, Some(client)) => Arc::new(
            PromptSelectionStrategy::new(client.clone(), settings.selection_prompt.clone())
                .with_history_window(settings.history_window),
        ),
        _ => Arc::new(SequentialSelectionStrategy::new()),
    };

    let termination: Arc<dyn TerminationStrategy> = match &client {
        Some(client) if !settings.termination_prompt.trim().is_empty() => Arc::new(
            PromptTerminationStrategy::new(
                client.clone(),
                settings.termination_prompt.clone(),
                &settings.termination_success,
            )?
            .with_allowed_agents(settings.termination_agents.clone())
            .with_history_window(settings.history_window),
        ),
        _ => Arc::new(
            KeywordTerminationStrategy::new(&settings.termination_success)?
                .with_allowed_agents(settings.termination_agents.clone()),
        ),
    };

    let mut conversation = Conversation::new(settings.name.clone())
        .with_options(options.clone())
        .with_history_mode(settings.history);
    conversation.initialize(agents, selection, termination, settings.max_iterations)?;
    Ok(conversation)
}
