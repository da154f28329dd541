pub mod foundry;
pub mod ollama;
pub mod openai;

pub use foundry::{CommandLocator, FoundryClient, ServiceLocator};
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LauncherError, Result};
use crate::provider::Provider;
use crate::state::ChatMessage;

/// Shown in place of a reply when the provider answered without one
pub const NO_RESPONSE: &str = "No response from the model.";

/// The capability set every model provider offers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> Provider;

    /// Ids of the models the provider can serve
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Send the messages and return the reply text
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Non-streaming chat request body shared by every local and cloud API
#[derive(Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

/// A model entry; Ollama calls the identifier `name`, OpenAI-style APIs `id`
#[derive(Deserialize)]
pub(crate) struct ModelDescriptor {
    id: Option<String>,
    name: Option<String>,
}

impl ModelDescriptor {
    pub fn identifier(self) -> Option<String> {
        self.id.or(self.name).filter(|s| !s.is_empty())
    }
}

/// Collect identifiers, failing if any descriptor has none
pub(crate) fn model_ids(models: Vec<ModelDescriptor>) -> Result<Vec<String>> {
    models
        .into_iter()
        .map(|m| {
            m.identifier()
                .ok_or_else(|| LauncherError::malformed("model entry without id or name"))
        })
        .collect()
}

/// Read the body of a response, turning non-2xx statuses into `Http` errors
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(LauncherError::http(status.as_u16(), &body));
    }

    Ok(body)
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|_| LauncherError::malformed(body))
}

/// Trimmed reply text, or the placeholder when there is nothing to show
pub(crate) fn reply_or_placeholder(content: Option<String>) -> String {
    content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}
