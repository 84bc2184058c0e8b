//! Self-hosted Ollama backend using the native `/api/chat` endpoint.

use crate::client_wrapper::{BackendError, ClientWrapper, Message, Role, TokenUsage};
use crate::clients::common::{encode_messages, post_json};
use crate::clients::http_pool::get_http_client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: &str) -> Self {
        let endpoint = if endpoint.trim().is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };
        OllamaClient {
            http: get_http_client(&endpoint),
            endpoint,
            model: model.to_string(),
            api_key: None,
            token_usage: Mutex::new(None),
        }
    }

    /// Bearer token for Ollama instances sitting behind an authenticating proxy.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        if !api_key.is_empty() {
            self.api_key = Some(api_key);
        }
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn parse_ollama_response(body: &str) -> Result<(String, TokenUsage), BackendError> {
    let response: OllamaChatResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    let usage = TokenUsage {
        input_tokens: response.prompt_eval_count,
        output_tokens: response.eval_count,
        total_tokens: response.prompt_eval_count + response.eval_count,
    };
    Ok((response.message.content, usage))
}

#[async_trait]
impl ClientWrapper for OllamaClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError> {
        let body = json!({
            "model": self.model,
            "messages": encode_messages(messages),
            "stream": false,
        });

        let mut request = self.http.post(format!("{}/api/chat", self.endpoint));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let text = post_json(request, &body).await.map_err(|e| {
            log::error!("conclave::clients::ollama: chat error: {}", e);
            e
        })?;
        let (content, usage) = parse_ollama_response(&text)?;
        *self.token_usage.lock().await = Some(usage);

        Ok(Message::new(Role::Assistant, content))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        self.token_usage.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ollama_response() {
        let body = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":true,"prompt_eval_count":7,"eval_count":3}"#;
        let (content, usage) = parse_ollama_response(body).unwrap();
        assert_eq!(content, "Hi");
        assert_eq!(usage.total_tokens, 10);
    }

    #[test]
    fn test_empty_endpoint_uses_default() {
        let client = OllamaClient::new("", "llama3.2");
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
    }
}
