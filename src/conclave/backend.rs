//! Model backend binding: backend kinds, client construction, and the guarded call path.
//!
//! Every model call made by the engine (speaker selection, termination checks, agent turns and
//! their tool round-trips) goes through [`invoke`], which adds three things the raw
//! [`ClientWrapper`] does not provide:
//!
//! * a per-call deadline ([`ExecutionOptions::request_timeout`]),
//! * a retry policy for transient failures, and
//! * cancellation from the caller's [`CancellationToken`].
//!
//! # Retry policy
//!
//! A failed call is retried only when [`BackendError::is_transient`] holds (timeouts, connection
//! failures, HTTP 408, 429 and 5xx). Attempt `n` (0-based) waits `retry_backoff * 2^n` before
//! the next try, up to `max_retries` retries. Anything else (bad credentials, unknown model,
//! undecodable reply) fails immediately. Exhausted or permanent failures surface as
//! [`ConclaveError::BackendUnavailable`].

use crate::client_wrapper::{BackendError, ClientWrapper, Message};
use crate::clients::azure::AzureOpenAIClient;
use crate::clients::gemini::GeminiClient;
use crate::clients::ollama::OllamaClient;
use crate::clients::openai::OpenAIClient;
use crate::config::BackendSettings;
use crate::error::ConclaveError;
use crate::event::EventHandler;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Supported model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Hosted OpenAI API.
    OpenAI,
    /// Enterprise-hosted Azure OpenAI deployment.
    AzureOpenAI,
    /// Self-hosted Ollama server.
    Ollama,
    /// Google Gemini.
    Gemini,
}

impl BackendKind {
    pub fn identifier(&self) -> &'static str {
        match self {
            BackendKind::OpenAI => "openai",
            BackendKind::AzureOpenAI => "azureopenai",
            BackendKind::Ollama => "ollama",
            BackendKind::Gemini => "gemini",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConclaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAI),
            "azureopenai" => Ok(BackendKind::AzureOpenAI),
            "ollama" => Ok(BackendKind::Ollama),
            "gemini" => Ok(BackendKind::Gemini),
            _ => Err(ConclaveError::Configuration(format!(
                "unknown backend '{}' (expected openai, azureopenai, ollama or gemini)",
                s
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Deadlines, retries and loop bounds applied to model calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    /// Deadline for a single model call.
    pub request_timeout: Duration,
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub retry_backoff: Duration,
    /// Tool invocations allowed within one agent turn.
    pub max_tool_calls_per_turn: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            max_tool_calls_per_turn: 5,
        }
    }
}

impl ExecutionOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_tool_calls_per_turn(mut self, max: usize) -> Self {
        self.max_tool_calls_per_turn = max;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.retry_backoff)
    }
}

/// Everything a model-calling component needs from the conversation that drives it.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Name of the conversation, for events and logs.
    pub conversation: &'a str,
    pub options: &'a ExecutionOptions,
    pub cancel: &'a CancellationToken,
    pub events: Option<&'a Arc<dyn EventHandler>>,
}

/// Creates the client an agent or scenario strategy talks to.
pub trait ClientFactory: Send + Sync {
    fn create_client(
        &self,
        kind: BackendKind,
        model: &str,
    ) -> Result<Arc<dyn ClientWrapper>, ConclaveError>;
}

/// Production [`ClientFactory`] backed by the HTTP clients in [`crate::clients`].
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    settings: BackendSettings,
}

impl HttpClientFactory {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

fn require(value: &str, what: &str, kind: BackendKind) -> Result<(), ConclaveError> {
    if value.trim().is_empty() {
        Err(ConclaveError::Configuration(format!(
            "backend '{}' requires {}",
            kind, what
        )))
    } else {
        Ok(())
    }
}

impl ClientFactory for HttpClientFactory {
    fn create_client(
        &self,
        kind: BackendKind,
        model: &str,
    ) -> Result<Arc<dyn ClientWrapper>, ConclaveError> {
        require(model, "a model name", kind)?;
        let client: Arc<dyn ClientWrapper> = match kind {
            BackendKind::OpenAI => {
                let s = &self.settings.openai;
                require(&s.api_key, "backends.openai.api_key", kind)?;
                let client = match &s.base_url {
                    Some(url) => OpenAIClient::new_with_base_url(&s.api_key, model, url),
                    None => OpenAIClient::new_with_model_string(&s.api_key, model),
                };
                Arc::new(client.with_organization(s.organization.clone()))
            }
            BackendKind::AzureOpenAI => {
                let s = &self.settings.azure_openai;
                require(&s.endpoint, "backends.azure_openai.endpoint", kind)?;
                require(&s.api_key, "backends.azure_openai.api_key", kind)?;
                let mut client = AzureOpenAIClient::new(&s.endpoint, &s.api_key, model);
                if let Some(version) = &s.api_version {
                    client = client.with_api_version(version.clone());
                }
                Arc::new(client)
            }
            BackendKind::Ollama => {
                let s = &self.settings.ollama;
                Arc::new(OllamaClient::new(&s.endpoint, model).with_api_key(s.api_key.clone()))
            }
            BackendKind::Gemini => {
                let s = &self.settings.gemini;
                require(&s.api_key, "backends.gemini.api_key", kind)?;
                Arc::new(match &s.base_url {
                    Some(url) => GeminiClient::new_with_base_url(&s.api_key, model, url),
                    None => GeminiClient::new_with_model_string(&s.api_key, model),
                })
            }
        };
        log::debug!("conclave::backend: created {} client for model {}", kind, model);
        Ok(client)
    }
}

/// A structured request from the model to run one of the agent's tools.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// What a model reply means to the turn loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    /// A final answer.
    Text(String),
    /// A tool invocation; `raw` is the reply text that carried it.
    ToolCall {
        request: ToolCallRequest,
        raw: String,
    },
}

impl BackendReply {
    /// Interpret reply text. Tool calls are only recognised when the caller declared tools.
    pub fn from_text(text: String, tools_declared: bool) -> Self {
        if tools_declared {
            if let Some(request) = parse_tool_call(&text) {
                return BackendReply::ToolCall { request, raw: text };
            }
        }
        BackendReply::Text(text)
    }
}

/// Find the first `{"tool_call": {"name": ..., "parameters": {...}}}` object in `response`.
///
/// The object may be surrounded by prose or a code fence. Braces inside JSON strings are
/// ignored while looking for the end of the object.
pub fn parse_tool_call(response: &str) -> Option<ToolCallRequest> {
    let start = response.find("{\"tool_call\"")?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;
    for (offset, ch) in response[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset + ch.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }

    let parsed: serde_json::Value = serde_json::from_str(&response[start..end?]).ok()?;
    let call = parsed.get("tool_call")?;
    let name = call.get("name")?.as_str()?.to_string();
    let parameters = call
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCallRequest { name, parameters })
}

/// Send `messages` through `client` with the deadline, retry and cancellation rules above.
pub async fn invoke(
    client: &dyn ClientWrapper,
    messages: &[Message],
    options: &ExecutionOptions,
    cancel: &CancellationToken,
) -> Result<Message, ConclaveError> {
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConclaveError::Cancelled),
            r = tokio::time::timeout(options.request_timeout, client.send_message(messages)) => r,
        };

        let err = match outcome {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(e)) => e,
            Err(_) => BackendError::Timeout,
        };

        if err.is_transient() && attempt < options.max_retries {
            let delay = options.backoff_for(attempt);
            log::warn!(
                "conclave::backend: {} call failed ({}), retry {}/{} in {:?}",
                client.model_name(),
                err,
                attempt + 1,
                options.max_retries,
                delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConclaveError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
            continue;
        }

        log::error!(
            "conclave::backend: {} call failed after {} attempt(s): {}",
            client.model_name(),
            attempt + 1,
            err
        );
        return Err(ConclaveError::BackendUnavailable(format!(
            "{} ({}, {} attempt(s))",
            err,
            client.model_name(),
            attempt + 1
        )));
    }
}
