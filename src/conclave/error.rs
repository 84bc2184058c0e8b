//! Error taxonomy shared by the orchestration engine.
//!
//! Every failure that can cross a public API boundary is expressed as a [`ConclaveError`].
//! The variants map one-to-one onto the ways a scenario run can go wrong:
//!
//! | Variant                  | Raised by                               | Fatal?                          |
//! |--------------------------|-----------------------------------------|---------------------------------|
//! | `Configuration`          | registry / scenario / conversation setup | yes, blocks the scenario        |
//! | `Selection`              | [`PromptSelectionStrategy`](crate::selection::PromptSelectionStrategy) | aborts the current `execute` |
//! | `TerminationAmbiguous`   | termination response interpretation     | no, treated as "not done"       |
//! | `ToolExecution`          | tool lookup / I/O / sandbox denial      | no, converted to text           |
//! | `BackendUnavailable`     | model calls after retries are exhausted | aborts the current `execute`    |
//! | `Cancelled`              | caller-supplied cancellation token      | aborts the current `execute`    |
//!
//! Failures that abort an `execute` call leave the conversation history intact and the
//! conversation reusable.

use std::error::Error;
use std::fmt;

/// Errors surfaced by agents, strategies, conversations and the scenario registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ConclaveError {
    /// Invalid or inconsistent configuration (empty agent set, unknown backend, missing agent).
    Configuration(String),
    /// The model-chosen speaker was not an eligible agent, even after a clarifying retry.
    Selection(String),
    /// The termination response was empty or could not be interpreted.
    TerminationAmbiguous(String),
    /// A tool could not be found or failed while running.
    ///
    /// Never returned from a turn: the agent feeds the failure back to its model as text and
    /// only reports it through this variant in its logs (see `ToolOutcome::as_error`).
    ToolExecution(String),
    /// The model backend could not be reached or rejected the request.
    BackendUnavailable(String),
    /// The caller cancelled the operation.
    Cancelled,
    /// A conversation was executed before `initialize` bound its agents and strategies.
    NotInitialized(String),
    /// No enabled scenario is registered under the requested name.
    ScenarioNotFound(String),
}

impl ConclaveError {
    /// `true` for failures that abort the running `execute` call.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ConclaveError::TerminationAmbiguous(_) | ConclaveError::ToolExecution(_)
        )
    }

    /// `true` if the error was produced by a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConclaveError::Cancelled)
    }
}

impl fmt::Display for ConclaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConclaveError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ConclaveError::Selection(msg) => write!(f, "Selection error: {}", msg),
            ConclaveError::TerminationAmbiguous(msg) => {
                write!(f, "Ambiguous termination response: {}", msg)
            }
            ConclaveError::ToolExecution(msg) => write!(f, "Tool execution error: {}", msg),
            ConclaveError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            ConclaveError::Cancelled => write!(f, "Operation cancelled"),
            ConclaveError::NotInitialized(name) => {
                write!(f, "Conversation '{}' has not been initialized", name)
            }
            ConclaveError::ScenarioNotFound(name) => write!(f, "Scenario '{}' not found", name),
        }
    }
}

impl Error for ConclaveError {}
