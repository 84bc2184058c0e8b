//! Agent registry with atomically swapped snapshots.
//!
//! The registry never mutates the agent collection in place. Readers take an
//! [`AgentSnapshot`] (an `Arc` to an immutable map) and keep using it for as long as they like;
//! [`replace_all`](AgentRegistry::replace_all) and [`upsert`](AgentRegistry::upsert) build a
//! complete new snapshot and swap the pointer under a short write lock. A turn that started
//! before an update finishes with the agents it started with.

use crate::agent::Agent;
use crate::backend::{BackendKind, ClientFactory};
use crate::config::AgentSettings;
use crate::error::ConclaveError;
use crate::tool_provider::ToolFactory;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Immutable view of the registered agents, in registration order.
#[derive(Debug, Default)]
pub struct AgentSnapshot {
    agents: HashMap<String, Arc<Agent>>,
    order: Vec<String>,
}

impl AgentSnapshot {
    fn from_agents(agents: Vec<Arc<Agent>>) -> Result<Self, ConclaveError> {
        let mut snapshot = AgentSnapshot::default();
        for agent in agents {
            let name = agent.name().to_string();
            if name.trim().is_empty() {
                return Err(ConclaveError::Configuration(
                    "agent name must not be empty".to_string(),
                ));
            }
            if snapshot.agents.contains_key(&name) {
                return Err(ConclaveError::Configuration(format!(
                    "duplicate agent name '{}'",
                    name
                )));
            }
            snapshot.order.push(name.clone());
            snapshot.agents.insert(name, agent);
        }
        Ok(snapshot)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn agents(&self) -> Vec<Arc<Agent>> {
        self.order
            .iter()
            .filter_map(|name| self.agents.get(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug)]
pub struct AgentRegistry {
    current: RwLock<Arc<AgentSnapshot>>,
}

impl AgentRegistry {
    /// Register `agents`; names must be unique and non-empty.
    pub fn new(agents: Vec<Agent>) -> Result<Self, ConclaveError> {
        let snapshot = AgentSnapshot::from_agents(agents.into_iter().map(Arc::new).collect())?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Build every configured agent and register them.
    pub fn from_settings(
        settings: &[AgentSettings],
        clients: &dyn ClientFactory,
        tools: &ToolFactory,
    ) -> Result<Self, ConclaveError> {
        let registry = Self::new(Self::build_agents(settings, clients, tools)?)?;
        log::info!(
            "conclave::agent_registry: {} agent(s) registered",
            registry.snapshot().len()
        );
        Ok(registry)
    }

    pub fn build_agents(
        settings: &[AgentSettings],
        clients: &dyn ClientFactory,
        tools: &ToolFactory,
    ) -> Result<Vec<Agent>, ConclaveError> {
        settings
            .iter()
            .map(|s| Self::build_agent(s, clients, tools))
            .collect()
    }

    /// Build one agent. Unknown backends are fatal; unknown tools only warn.
    pub fn build_agent(
        settings: &AgentSettings,
        clients: &dyn ClientFactory,
        tools: &ToolFactory,
    ) -> Result<Agent, ConclaveError> {
        let kind: BackendKind = settings.backend.parse().map_err(|e| match e {
            ConclaveError::Configuration(msg) => {
                ConclaveError::Configuration(format!("agent '{}': {}", settings.name, msg))
            }
            other => other,
        })?;
        let client = clients.create_client(kind, &settings.model)?;

        let mut agent = Agent::new(settings.name.clone(), settings.description.clone(), client)
            .with_instructions(settings.instructions.clone())
            .with_backend(kind);

        for tool_name in &settings.tools {
            match tools.create(tool_name) {
                Some(protocol) => agent = agent.with_tool_protocol(tool_name.clone(), protocol),
                None => log::warn!(
                    "conclave::agent_registry: agent '{}' references unknown tool '{}'; continuing without it",
                    settings.name,
                    tool_name
                ),
            }
        }

        log::info!(
            "conclave::agent_registry: agent '{}' configured ({} / {})",
            settings.name,
            kind,
            settings.model
        );
        Ok(agent)
    }

    /// The current set of agents. Later updates do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Arc<AgentSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.snapshot().get(name)
    }

    /// Build the next snapshot from the current one and store it, all under the write lock,
    /// so concurrent updates never merge against the same stale snapshot.
    fn update<F>(&self, build: F) -> Result<(), ConclaveError>
    where
        F: FnOnce(&AgentSnapshot) -> Result<AgentSnapshot, ConclaveError>,
    {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = build(&**guard)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Replace the whole agent set.
    pub fn replace_all(&self, agents: Vec<Agent>) -> Result<(), ConclaveError> {
        let agents: Vec<Arc<Agent>> = agents.into_iter().map(Arc::new).collect();
        self.update(|_| AgentSnapshot::from_agents(agents))
    }

    /// Replace agents with matching names and append new ones, keeping the rest.
    pub fn upsert(&self, agents: Vec<Agent>) -> Result<(), ConclaveError> {
        let mut incoming: Vec<Arc<Agent>> = agents.into_iter().map(Arc::new).collect();
        self.update(|current| {
            let mut merged = Vec::with_capacity(current.len() + incoming.len());
            for existing in current.agents() {
                match incoming.iter().position(|a| a.name() == existing.name()) {
                    Some(i) => merged.push(incoming.remove(i)),
                    None => merged.push(existing),
                }
            }
            merged.extend(incoming);
            AgentSnapshot::from_agents(merged)
        })
    }
}
