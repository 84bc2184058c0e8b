//! Wire codec shared by every OpenAI-compatible backend (OpenAI, Azure OpenAI, Gemini).
//!
//! The functions here build the `chat/completions` request body, execute it through a pooled
//! `reqwest::Client`, classify failures into [`BackendError`], and record token usage for
//! [`ClientWrapper::get_last_usage`](crate::client_wrapper::ClientWrapper::get_last_usage).

use crate::client_wrapper::{BackendError, Message, Role, TokenUsage};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

/// Convert messages into the `[{"role": ..., "content": ...}]` array expected by chat APIs.
pub fn encode_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content.as_ref() }))
        .collect()
}

/// Decode a `chat/completions` response body into the reply text and its usage.
pub fn parse_chat_completion(body: &str) -> Result<(String, Option<TokenUsage>), BackendError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Decode("response contained no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();

    let usage = response.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok((content, usage))
}

/// Classify a `reqwest` failure.
pub fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if let Some(status) = err.status() {
        BackendError::Status {
            code: status.as_u16(),
            body: err.to_string(),
        }
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// POST a JSON body and return the response text, mapping non-2xx statuses to errors.
pub async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<String, BackendError> {
    let response = request.json(body).send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    let text = response.text().await.map_err(map_reqwest_error)?;

    if !status.is_success() {
        return Err(BackendError::Status {
            code: status.as_u16(),
            body: text,
        });
    }

    Ok(text)
}

/// Send a chat request, record its usage, and return the assistant's reply.
pub async fn send_and_track(
    request: reqwest::RequestBuilder,
    model: Option<&str>,
    messages: &[Message],
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<Message, BackendError> {
    let mut body = json!({ "messages": encode_messages(messages) });
    if let Some(model) = model {
        body["model"] = json!(model);
    }

    let text = match post_json(request, &body).await {
        Ok(text) => text,
        Err(err) => {
            log::error!(
                "conclave::clients::common::send_and_track(...): chat completion error: {}",
                err
            );
            return Err(err);
        }
    };

    let (content, usage) = parse_chat_completion(&text)?;
    *usage_slot.lock().await = usage;

    Ok(Message::new(Role::Assistant, content))
}
