use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{model_ids, parse_json, read_body, reply_or_placeholder, ChatProvider, ChatRequest, ModelDescriptor};
use crate::config::{DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::{LauncherError, Result};
use crate::provider::Provider;
use crate::state::ChatMessage;

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIResponseMessage>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIModelsResponse {
    data: Vec<ModelDescriptor>,
}

/// `POST {base_url}/v1/chat/completions` against any OpenAI-compatible API
pub(crate) async fn chat_completions(
    client: &Client,
    base_url: &str,
    api_key: Option<&str>,
    model: &str,
    messages: &[ChatMessage],
    timeout: Duration,
) -> Result<String> {
    let request = ChatRequest {
        model,
        messages,
        stream: false,
    };

    let mut builder = client
        .post(format!("{}/v1/chat/completions", base_url))
        .timeout(timeout)
        .json(&request);
    if let Some(key) = api_key {
        builder = builder.bearer_auth(key);
    }

    let body = read_body(builder.send().await?).await?;
    let openai_response: OpenAIResponse = parse_json(&body)?;

    Ok(reply_or_placeholder(
        openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content),
    ))
}

/// `GET {base_url}/v1/models`
pub(crate) async fn list_model_ids(client: &Client, base_url: &str, timeout: Duration) -> Result<Vec<String>> {
    let response = client
        .get(format!("{}/v1/models", base_url))
        .timeout(timeout)
        .send()
        .await?;
    let body = read_body(response).await?;

    let models_response: OpenAIModelsResponse = parse_json(&body)?;
    model_ids(models_response.data)
}

/// Cloud client for OpenAI's chat completions API
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_client(Client::new(), DEFAULT_OPENAI_URL, api_key, DEFAULT_OPENAI_MODEL)
    }

    pub fn with_client(client: Client, base_url: &str, api_key: Option<&str>, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn require_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LauncherError::config("OpenAI API key not set. Add one in settings."))
    }
}

#[async_trait]
impl ChatProvider for OpenAIClient {
    fn kind(&self) -> Provider {
        Provider::OpenAI
    }

    /// The cloud model is fixed; nothing to ask the network
    async fn list_models(&self) -> Result<Vec<String>> {
        self.require_key()?;
        Ok(vec![self.model.clone()])
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let key = self.require_key()?;

        debug!(model = %self.model, messages = messages.len(), "openai chat request");

        chat_completions(
            &self.client,
            &self.base_url,
            Some(key),
            &self.model,
            messages,
            self.timeout,
        )
        .await
    }
}
