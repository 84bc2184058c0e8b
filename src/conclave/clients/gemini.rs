//! Google Gemini backend through its OpenAI-compatible endpoint.

use crate::client_wrapper::{BackendError, ClientWrapper, Message, TokenUsage};
use crate::clients::common::send_and_track;
use crate::clients::http_pool::get_http_client;
use async_trait::async_trait;
use tokio::sync::Mutex;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl GeminiClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, DEFAULT_BASE_URL)
    }

    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        GeminiClient {
            http: get_http_client(&base_url),
            base_url,
            api_key: secret_key.to_string(),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ClientWrapper for GeminiClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError> {
        let request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);

        send_and_track(request, Some(&self.model), messages, &self.token_usage).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        self.token_usage.lock().await.clone()
    }
}
