use async_trait::async_trait;
use reqwest::Client;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::ai::foundry::{select_model, DISCOVERY_TIMEOUT};
use crate::ai::{ChatProvider, CommandLocator, FoundryClient, OllamaClient, OpenAIClient};
use crate::config::Config;
use crate::error::{with_timeout, LauncherError, Result};
use crate::health::HealthStatus;
use crate::provider::{Endpoint, Provider, ProviderConfig};
use crate::state::ChatMessage;

/// Anything that can turn a send view into a reply.
///
/// The send queue only needs this, which keeps it testable without HTTP.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn ask(&self, view: &[ChatMessage]) -> Result<String>;
}

/// Routes requests to the active provider.
///
/// Settings live behind a lock; every call works on a snapshot taken when
/// it starts, so switching providers mid-request is last-write-wins.
pub struct Dispatcher {
    client: Client,
    config: RwLock<Config>,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> Config {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Apply `change` to the settings and return the result
    pub fn update_config(&self, change: impl FnOnce(&mut Config)) -> Config {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut config);
        config.clone()
    }

    pub fn active_provider(&self) -> Provider {
        self.config().active_provider()
    }

    pub fn snapshot(&self) -> ProviderConfig {
        self.config().provider_config()
    }

    /// Build the client for `config`, bounding each request by `timeout`
    pub fn provider_for(&self, config: &ProviderConfig, timeout: Duration) -> Result<Box<dyn ChatProvider>> {
        let client = self.client.clone();
        let model = config.model.as_deref();

        let provider: Box<dyn ChatProvider> = match (config.kind, &config.endpoint) {
            (Provider::Ollama, Endpoint::Fixed(url)) => Box::new(
                OllamaClient::with_client(client, url, model.unwrap_or_default()).with_timeout(timeout),
            ),
            (Provider::OpenAI, Endpoint::Fixed(url)) => Box::new(
                OpenAIClient::with_client(client, url, config.credential.as_deref(), model.unwrap_or_default())
                    .with_timeout(timeout),
            ),
            (Provider::Foundry, Endpoint::Discover { program, args }) => {
                let locator = CommandLocator::new(program, args).with_timeout(timeout.min(DISCOVERY_TIMEOUT));
                Box::new(FoundryClient::with_client(client, Box::new(locator), model).with_timeout(timeout))
            }
            (kind, endpoint) => {
                return Err(LauncherError::config(format!(
                    "Provider {} cannot use endpoint {:?}",
                    kind, endpoint
                )))
            }
        };

        Ok(provider)
    }

    /// Probe the active provider. Never fails; problems land in the status.
    pub async fn check_health(&self) -> HealthStatus {
        let config = self.snapshot();
        let kind = config.kind;

        match with_timeout(config.health_timeout, self.check(&config)).await {
            Ok(status) => status,
            Err(e) => HealthStatus::failed(kind, e.to_string()),
        }
    }

    async fn check(&self, config: &ProviderConfig) -> Result<HealthStatus> {
        let provider = self.provider_for(config, config.health_timeout)?;

        match config.kind {
            Provider::Ollama => {
                let wanted = config.model.clone().unwrap_or_default();
                let models = provider.list_models().await?;
                if models.iter().any(|m| *m == wanted) {
                    Ok(HealthStatus::reachable(config.kind, Some(wanted)))
                } else {
                    Ok(HealthStatus::reachable(config.kind, None)
                        .with_warning(format!("{} is not pulled", wanted)))
                }
            }
            Provider::Foundry => {
                let models = provider.list_models().await?;
                let model = select_model(&models, config.model.as_deref());
                if model.is_empty() {
                    return Err(LauncherError::config("No Foundry models found"));
                }
                Ok(HealthStatus::reachable(config.kind, Some(model)))
            }
            Provider::OpenAI => {
                let models = provider.list_models().await?;
                Ok(HealthStatus::reachable(config.kind, models.into_iter().next()))
            }
        }
    }
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn ask(&self, view: &[ChatMessage]) -> Result<String> {
        let config = self.snapshot();
        let provider = self.provider_for(&config, config.request_timeout)?;

        info!(provider = %config.kind, messages = view.len(), "dispatch started");
        let started = Instant::now();

        let result = with_timeout(config.request_timeout, provider.chat(view)).await;

        match &result {
            Ok(reply) => info!(
                provider = %config.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                reply_chars = reply.chars().count(),
                "dispatch succeeded"
            ),
            Err(e) => warn!(
                provider = %config.kind,
                kind = e.kind(),
                error = %e,
                "dispatch failed"
            ),
        }

        result
    }
}
