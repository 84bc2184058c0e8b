//! Hosted OpenAI backend.
//!
//! ```rust,no_run
//! use conclave::clients::openai::{Model, OpenAIClient};
//!
//! let client = OpenAIClient::new_with_model_enum("sk-...", Model::GPT4oMini)
//!     .with_organization("org-123");
//! ```

use crate::client_wrapper::{BackendError, ClientWrapper, Message, TokenUsage};
use crate::clients::common::send_and_track;
use crate::clients::http_pool::get_http_client;
use async_trait::async_trait;
use tokio::sync::Mutex;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Commonly used OpenAI chat models. Anything else can be passed as a string.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    GPT4o,
    GPT4oMini,
    GPT41,
    GPT41Mini,
    O1Mini,
    O3Mini,
}

pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPT4oMini => "gpt-4o-mini".to_string(),
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::O1Mini => "o1-mini".to_string(),
        Model::O3Mini => "o3-mini".to_string(),
    }
}

pub struct OpenAIClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    organization: Option<String>,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, DEFAULT_BASE_URL)
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_string(secret_key, &model_to_string(model))
    }

    /// Point the client at any OpenAI-compatible endpoint (proxies, gateways, local servers).
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        OpenAIClient {
            http: get_http_client(&base_url),
            base_url,
            api_key: secret_key.to_string(),
            organization: None,
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        let organization = organization.into();
        if !organization.is_empty() {
            self.organization = Some(organization);
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, BackendError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }

        send_and_track(request, Some(&self.model), messages, &self.token_usage).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn get_last_usage(&self) -> Option<TokenUsage> {
        self.token_usage.lock().await.clone()
    }
}
