//! Configuration records for agents, scenarios, tools and backends.
//!
//! The whole configuration is one JSON document, loaded once at startup:
//!
//! ```json
//! {
//!   "backends": { "openai": { "api_key": "sk-..." } },
//!   "tools": [
//!     { "name": "FileSystem", "description": "Project files", "parameters": { "basepath": "/data" } }
//!   ],
//!   "agents": [
//!     { "name": "Writer", "description": "Drafts copy", "backend": "openai", "model": "gpt-4o",
//!       "instructions": "You write concise marketing copy.", "tools": ["FileSystem"] },
//!     { "name": "Critic", "description": "Reviews copy", "backend": "openai", "model": "gpt-4o-mini",
//!       "instructions": "Review the draft. Say APPROVED when it is ready." }
//!   ],
//!   "scenarios": [
//!     { "name": "copywriting", "agents": ["Writer", "Critic"],
//!       "termination_agents": ["Critic"], "termination_success": "APPROVED",
//!       "max_iterations": 10, "backend": "openai", "model": "gpt-4o-mini" }
//!   ]
//! }
//! ```
//!
//! Secrets can stay out of the file: see [`ConclaveConfig::apply_env_overrides`].

use crate::backend::ExecutionOptions;
use crate::error::ConclaveError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Location checked first by [`ConclaveConfig::load`] (container deployments mount it here).
pub const CONTAINER_CONFIG_PATH: &str = "/config/appsettings.json";

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConclaveConfig {
    pub agents: Vec<AgentSettings>,
    pub scenarios: Vec<ScenarioSettings>,
    pub tools: Vec<ToolSettings>,
    pub backends: BackendSettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub name: String,
    pub description: String,
    /// Backend identifier: `openai`, `azureopenai`, `ollama` or `gemini`.
    pub backend: String,
    pub instructions: String,
    pub model: String,
    /// Names of configured tools this agent may call.
    pub tools: Vec<String>,
}

/// Whether a scenario's history survives between `execute` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Every `execute` appends to the history left by the previous one.
    Cumulative,
    /// Each `execute` starts from an empty history.
    Reset,
}

impl Default for HistoryMode {
    fn default() -> Self {
        HistoryMode::Cumulative
    }
}

/// How the next speaker is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Ask the scenario's model, using `selection_prompt`.
    Prompt,
    /// Round robin in scenario agent order, no model call.
    Sequential,
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::Prompt
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    pub name: String,
    pub description: String,
    /// Participating agents, by name.
    pub agents: Vec<String>,
    pub selection: SelectionMode,
    /// Template with `{{$agents}}` and `{{$history}}` placeholders. Empty uses the default.
    pub selection_prompt: String,
    /// Template with a `{{$history}}` placeholder. Empty selects keyword termination.
    pub termination_prompt: String,
    /// Agents whose messages the termination check may read. Empty means all scenario agents.
    pub termination_agents: Vec<String>,
    /// Marker that ends the conversation when found (case-insensitive) in the termination verdict.
    pub termination_success: String,
    pub enabled: bool,
    pub history: HistoryMode,
    /// Only the most recent `n` messages are rendered into strategy prompts.
    pub history_window: Option<usize>,
    pub max_iterations: usize,
    /// Backend and model used for selection and termination calls.
    pub backend: String,
    pub model: String,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            agents: Vec::new(),
            selection: SelectionMode::default(),
            selection_prompt: String::new(),
            termination_prompt: String::new(),
            termination_agents: Vec::new(),
            termination_success: String::new(),
            enabled: true,
            history: HistoryMode::default(),
            history_window: None,
            max_iterations: 10,
            backend: String::new(),
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub name: String,
    pub description: String,
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    pub api_key: String,
    pub organization: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureOpenAISettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: Option<String>,
}

/// Connection settings for every backend kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub openai: OpenAISettings,
    pub azure_openai: AzureOpenAISettings,
    pub ollama: OllamaSettings,
    pub gemini: GeminiSettings,
}

/// Timeouts, retries and tool-loop bound applied to every model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_tool_calls_per_turn: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        let defaults = ExecutionOptions::default();
        Self {
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_retries: defaults.max_retries,
            retry_backoff_ms: defaults.retry_backoff.as_millis() as u64,
            max_tool_calls_per_turn: defaults.max_tool_calls_per_turn,
        }
    }
}

impl ExecutionSettings {
    pub fn to_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_tool_calls_per_turn: self.max_tool_calls_per_turn,
        }
    }
}

impl ConclaveConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConclaveError> {
        serde_json::from_str(json)
            .map_err(|e| ConclaveError::Configuration(format!("invalid configuration: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConclaveError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConclaveError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        log::info!("conclave::config: loaded configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Load from [`CONTAINER_CONFIG_PATH`] when it exists, otherwise from `fallback`, then apply
    /// environment overrides.
    pub fn load(fallback: impl AsRef<Path>) -> Result<Self, ConclaveError> {
        let container = Path::new(CONTAINER_CONFIG_PATH);
        let mut config = if container.exists() {
            Self::from_file(container)?
        } else {
            Self::from_file(fallback)?
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overlay backend secrets and endpoints from the process environment.
    ///
    /// | Variable                | Setting                         |
    /// |-------------------------|---------------------------------|
    /// | `OPENAI_API_KEY`        | `backends.openai.api_key`       |
    /// | `OPENAI_ORGANIZATION`   | `backends.openai.organization`  |
    /// | `AZURE_OPENAI_API_KEY`  | `backends.azure_openai.api_key` |
    /// | `AZURE_OPENAI_ENDPOINT` | `backends.azure_openai.endpoint`|
    /// | `OLLAMA_ENDPOINT`       | `backends.ollama.endpoint`      |
    /// | `GEMINI_API_KEY`        | `backends.gemini.api_key`       |
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with a custom variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let backends = &mut self.backends;
        let targets: Vec<(&str, &mut String)> = vec![
            ("OPENAI_API_KEY", &mut backends.openai.api_key),
            ("OPENAI_ORGANIZATION", &mut backends.openai.organization),
            ("AZURE_OPENAI_API_KEY", &mut backends.azure_openai.api_key),
            ("AZURE_OPENAI_ENDPOINT", &mut backends.azure_openai.endpoint),
            ("OLLAMA_ENDPOINT", &mut backends.ollama.endpoint),
            ("GEMINI_API_KEY", &mut backends.gemini.api_key),
        ];
        for (key, slot) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                log::debug!("conclave::config: {} overridden from environment", key);
                *slot = value;
            }
        }
    }
}
