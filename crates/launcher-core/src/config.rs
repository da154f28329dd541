use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::provider::{Endpoint, Provider, ProviderConfig};

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma3:4b";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_FOUNDRY_COMMAND: [&str; 3] = ["foundry", "service", "status"];
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2500;

const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Persisted launcher settings.
///
/// Every field is optional so older or hand-edited files keep loading;
/// the accessors fill in defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_url: Option<String>,
    pub openai_model: Option<String>,
    pub foundry_prefer: Option<String>,
    pub foundry_command: Option<Vec<String>>,
    pub request_timeout_secs: Option<u64>,
    pub health_timeout_ms: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Ollama.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Directory holding the config file and the log file
    pub fn app_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("ai-launcher"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    pub fn active_provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or(Provider::Ollama)
    }

    /// OpenAI key, environment first, then the stored one
    pub fn openai_key(&self) -> Option<String> {
        resolve_key(std::env::var(OPENAI_KEY_ENV).ok(), self.openai_api_key.clone())
    }

    /// Returns where the OpenAI key comes from: "env", "config", or None
    pub fn openai_key_source(&self) -> Option<&'static str> {
        if resolve_key(std::env::var(OPENAI_KEY_ENV).ok(), None).is_some() {
            Some("env")
        } else if resolve_key(None, self.openai_api_key.clone()).is_some() {
            Some("config")
        } else {
            None
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms.unwrap_or(DEFAULT_HEALTH_TIMEOUT_MS))
    }

    /// Configuration of the active provider
    pub fn provider_config(&self) -> ProviderConfig {
        self.provider_config_for(self.active_provider())
    }

    pub fn provider_config_for(&self, kind: Provider) -> ProviderConfig {
        let (endpoint, model, credential) = match kind {
            Provider::Ollama => (
                Endpoint::Fixed(or_default(&self.ollama_url, DEFAULT_OLLAMA_URL)),
                Some(or_default(&self.ollama_model, DEFAULT_OLLAMA_MODEL)),
                None,
            ),
            Provider::Foundry => {
                let mut command = self
                    .foundry_command
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_FOUNDRY_COMMAND.map(String::from).to_vec());
                let program = command.remove(0);
                (
                    Endpoint::Discover { program, args: command },
                    self.foundry_prefer.clone().filter(|p| !p.trim().is_empty()),
                    None,
                )
            }
            Provider::OpenAI => (
                Endpoint::Fixed(or_default(&self.openai_url, DEFAULT_OPENAI_URL)),
                Some(or_default(&self.openai_model, DEFAULT_OPENAI_MODEL)),
                self.openai_key(),
            ),
        };

        ProviderConfig {
            kind,
            endpoint,
            model,
            credential,
            request_timeout: self.request_timeout(),
            health_timeout: self.health_timeout(),
        }
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

fn resolve_key(env: Option<String>, stored: Option<String>) -> Option<String> {
    env.into_iter()
        .chain(stored)
        .map(|k| k.trim().to_string())
        .find(|k| !k.is_empty())
}
