use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::events::SessionEvent;
use crate::provider::Provider;

/// How often the front-end refreshes its status line
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(8);

/// Result of one health check. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub provider: Provider,
    pub ok: bool,
    /// Model the next chat would use, when known
    pub model: Option<String>,
    /// Failure reason, or a warning when `ok` is still true
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn reachable(provider: Provider, model: Option<String>) -> Self {
        Self {
            provider,
            ok: true,
            model,
            error: None,
        }
    }

    pub fn failed(provider: Provider, error: impl Into<String>) -> Self {
        Self {
            provider,
            ok: false,
            model: None,
            error: Some(error.into()),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.error = Some(warning.into());
        self
    }

    /// One-line summary for a status bar
    pub fn summary(&self) -> String {
        let model = self.model.as_deref().unwrap_or("");
        match (self.provider, self.ok) {
            (Provider::OpenAI, true) => format!("Provider: OpenAI • Model: {}", model),
            (Provider::OpenAI, false) => "Provider: OpenAI • Key missing".to_string(),
            (Provider::Foundry, true) => format!("Provider: Local (Foundry) • Connected • {}", model),
            (Provider::Foundry, false) => "Provider: Local (Foundry) • Error".to_string(),
            (Provider::Ollama, true) => match &self.error {
                Some(warning) => format!("Provider: Local (Ollama) • Connected • {}", warning),
                None => format!("Provider: Local (Ollama) • Connected • {}", model),
            },
            (Provider::Ollama, false) => "Provider: Local (Ollama) • Not reachable".to_string(),
        }
    }
}

/// Probe the active provider every `every`, publishing each result.
///
/// The task stops once the receiving side of `events` is gone.
pub fn spawn_health_poller(
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    events: UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let status = dispatcher.check_health().await;
            debug!(provider = %status.provider, ok = status.ok, "health polled");
            if events.send(SessionEvent::Health(status)).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lines() {
        let ok = HealthStatus::reachable(Provider::Foundry, Some("phi-4".into()));
        assert_eq!(ok.summary(), "Provider: Local (Foundry) • Connected • phi-4");

        let missing = HealthStatus::failed(Provider::OpenAI, "no key");
        assert_eq!(missing.summary(), "Provider: OpenAI • Key missing");

        let down = HealthStatus::failed(Provider::Ollama, "connection refused");
        assert_eq!(down.summary(), "Provider: Local (Ollama) • Not reachable");
    }
}
