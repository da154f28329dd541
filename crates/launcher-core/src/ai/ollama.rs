use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{model_ids, parse_json, read_body, reply_or_placeholder, ChatProvider, ChatRequest, ModelDescriptor};
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::error::Result;
use crate::provider::Provider;
use crate::state::ChatMessage;

#[derive(Deserialize)]
struct OllamaReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaReply>,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<ModelDescriptor>,
}

/// Client for a local Ollama server on a known port
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_client(Client::new(), base_url, model)
    }

    pub fn with_client(client: Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
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

    pub async fn has_model(&self, name: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == name))
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    fn kind(&self) -> Provider {
        Provider::Ollama
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).timeout(self.timeout).send().await?;
        let body = read_body(response).await?;

        let models_response: OllamaModelsResponse = parse_json(&body)?;
        model_ids(models_response.models)
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        debug!(model = %self.model, messages = messages.len(), "ollama chat request");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        let body = read_body(response).await?;

        let ollama_response: OllamaChatResponse = parse_json(&body)?;
        Ok(reply_or_placeholder(
            ollama_response.message.and_then(|m| m.content),
        ))
    }
}
