//! Enterprise-hosted Azure OpenAI backend.
//!
//! Azure routes by deployment rather than by model name and authenticates with an `api-key`
//! header, so requests go to
//! `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`.

use crate::client_wrapper::{BackendError, ClientWrapper, Message, TokenUsage};
use crate::clients::common::send_and_track;
use crate::clients::http_pool::get_http_client;
use async_trait::async_trait;
use tokio::sync::Mutex;

pub const DEFAULT_API_VERSION: &str = "2024-10-21";

pub struct AzureOpenAIClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl AzureOpenAIClient {
    pub fn new(endpoint: &str, api_key: &str, deployment: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        AzureOpenAIClient {
            http: get_http_client(&endpoint),
            endpoint,
            api_key: api_key.to_string(),
            deployment: deployment.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Fully-qualified chat completions URL for this deployment.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl ClientWrapper for AzureOpenAIClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError> {
        let request = self
            .http
            .post(self.completions_url())
            .header("api-key", &self.api_key);

        send_and_track(request, None, messages, &self.token_usage).await
    }

    fn model_name(&self) -> &str {
        &self.deployment
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        self.token_usage.lock().await.clone()
    }
}
