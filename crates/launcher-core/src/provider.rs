use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Foundry,
    OpenAI,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::Foundry => "foundry",
            Provider::OpenAI => "openai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Provider::Ollama),
            "foundry" => Some(Provider::Foundry),
            "openai" => Some(Provider::OpenAI),
            _ => None,
        }
    }

    pub fn all() -> Vec<Provider> {
        vec![Provider::Ollama, Provider::Foundry, Provider::OpenAI]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Local (Ollama)",
            Provider::Foundry => "Local (Foundry)",
            Provider::OpenAI => "OpenAI",
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, Provider::OpenAI)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a provider's HTTP API lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Known base URL
    Fixed(String),
    /// Base URL read from the output of a status command
    Discover { program: String, args: Vec<String> },
}

/// Snapshot of everything one provider call needs.
///
/// Taken at the start of each dispatch, so a settings change never tears
/// a request that is already running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: Provider,
    pub endpoint: Endpoint,
    /// Exact model id for fixed providers, a preference for discovered ones
    pub model: Option<String>,
    pub credential: Option<String>,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
}
