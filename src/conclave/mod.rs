// src/conclave/mod.rs

pub mod agent;
pub mod agent_registry;
pub mod backend;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod history;
pub mod prompt;
pub mod scenario;
pub mod selection;
pub mod termination;
pub mod tool_protocol;
pub mod tool_provider;
pub mod tools;

// Let's export the types callers touch most so they are reachable as conclave::Conversation
// instead of conclave::conversation::Conversation.
pub use agent::Agent;
pub use conversation::{Conversation, Transcript};
pub use scenario::ScenarioRegistry;
