//! Foundry Local: a local model service on a port that changes between
//! runs, found by asking its CLI for the service status.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::openai::{chat_completions, list_model_ids};
use super::ChatProvider;
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::error::{LauncherError, Result};
use crate::provider::Provider;
use crate::state::ChatMessage;

/// Hardware-specific builds, best first
pub const HARDWARE_VARIANTS: [&str; 4] = ["openvino", "gpu", "npu", "cuda"];

/// Tried in order when the preference matches nothing
pub const FALLBACK_PATTERNS: [&str; 2] = ["phi-3.5", "phi-4"];

/// Longest the status command may run
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of the service status text the base URL is read from
#[async_trait]
pub trait ServiceLocator: Send + Sync {
    async fn status_text(&self) -> Result<String>;
}

/// Runs the Foundry CLI (`foundry service status` by default)
pub struct CommandLocator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLocator {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            timeout: DISCOVERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ServiceLocator for CommandLocator {
    async fn status_text(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(LauncherError::config(format!(
                    "Could not run `{}`: {}",
                    self.program, e
                )))
            }
            Err(_) => return Err(LauncherError::Timeout),
        };

        // The CLI prints the URL on stdout, but some versions use stderr
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

fn loopback_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(https?)://(127\.0\.0\.1|localhost):(\d+)").expect("static pattern is valid")
    })
}

/// Pull `scheme://host:port` for the loopback service out of status text
pub fn parse_base_url(status: &str) -> Result<String> {
    let captures = loopback_url_pattern().captures(status).ok_or_else(|| {
        LauncherError::config("Foundry service URL not found in status output. Is the service running?")
    })?;

    let port = captures[3]
        .parse::<u32>()
        .ok()
        .filter(|p| (1..=u32::from(u16::MAX)).contains(p))
        .ok_or_else(|| LauncherError::config(format!("Invalid Foundry port: {}", &captures[3])))?;

    Ok(format!("{}://{}:{}", &captures[1], &captures[2], port))
}

fn contains(id: &str, needle: &str) -> bool {
    id.to_lowercase().contains(&needle.to_lowercase())
}

/// Pick a model id from `available`.
///
/// Exact (case-insensitive) match on the preference wins, then a match
/// that is also a hardware-specific build, then any match containing the
/// preference, then the fallback patterns, then simply the first model.
/// Returns an empty string when nothing is available.
pub fn select_model(available: &[String], preference: Option<&str>) -> String {
    let preference = preference.map(str::trim).filter(|p| !p.is_empty());

    if let Some(pref) = preference {
        if let Some(id) = available.iter().find(|id| id.eq_ignore_ascii_case(pref)) {
            return id.clone();
        }

        for variant in HARDWARE_VARIANTS {
            if let Some(id) = available
                .iter()
                .find(|id| contains(id, pref) && contains(id, variant))
            {
                return id.clone();
            }
        }

        if let Some(id) = available.iter().find(|id| contains(id, pref)) {
            return id.clone();
        }
    }

    for pattern in FALLBACK_PATTERNS {
        if let Some(id) = available.iter().find(|id| contains(id, pattern)) {
            return id.clone();
        }
    }

    available.first().cloned().unwrap_or_default()
}

pub struct FoundryClient {
    client: Client,
    locator: Box<dyn ServiceLocator>,
    preference: Option<String>,
    timeout: Duration,
}

impl FoundryClient {
    pub fn new(locator: Box<dyn ServiceLocator>, preference: Option<&str>) -> Self {
        Self::with_client(Client::new(), locator, preference)
    }

    pub fn with_client(client: Client, locator: Box<dyn ServiceLocator>, preference: Option<&str>) -> Self {
        Self {
            client,
            locator,
            preference: preference.map(str::to_string),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn base_url(&self) -> Result<String> {
        let status = self.locator.status_text().await?;
        let base_url = parse_base_url(&status)?;
        debug!(%base_url, "foundry service discovered");
        Ok(base_url)
    }

    /// Discover the service and choose a model, returning `(base_url, model)`
    pub async fn resolve(&self) -> Result<(String, String)> {
        let base_url = self.base_url().await?;
        let models = list_model_ids(&self.client, &base_url, self.timeout).await?;

        let model = select_model(&models, self.preference.as_deref());
        if model.is_empty() {
            return Err(LauncherError::config(
                "No Foundry models found. Download one with `foundry model run`.",
            ));
        }

        info!(%model, available = models.len(), "foundry model selected");
        Ok((base_url, model))
    }
}

#[async_trait]
impl ChatProvider for FoundryClient {
    fn kind(&self) -> Provider {
        Provider::Foundry
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let base_url = self.base_url().await?;
        list_model_ids(&self.client, &base_url, self.timeout).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let (base_url, model) = self.resolve().await?;

        debug!(%model, messages = messages.len(), "foundry chat request");

        chat_completions(&self.client, &base_url, None, &model, messages, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_base_url_from_status() {
        let status = "🟢 Model management service is running on http://127.0.0.1:5273/openai/status";
        assert_eq!(parse_base_url(status).unwrap(), "http://127.0.0.1:5273");
    }

    #[test]
    fn test_parse_base_url_accepts_localhost_https() {
        assert_eq!(
            parse_base_url("up at https://localhost:61234").unwrap(),
            "https://localhost:61234"
        );
    }

    #[test]
    fn test_parse_base_url_without_match() {
        assert!(matches!(
            parse_base_url("🔴 Model management service is not running!"),
            Err(LauncherError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_base_url_rejects_bad_ports() {
        assert!(parse_base_url("http://127.0.0.1:0").is_err());
        assert!(parse_base_url("http://127.0.0.1:70000").is_err());
        assert!(parse_base_url("http://127.0.0.1:99999999999999999999").is_err());
    }

    #[test]
    fn test_select_prefers_hardware_variant() {
        let available = ids(&["phi-3.5-mini-openvino", "phi-4", "llama-3"]);
        assert_eq!(select_model(&available, Some("phi-3.5")), "phi-3.5-mini-openvino");
    }

    #[test]
    fn test_select_exact_match_is_case_insensitive() {
        let available = ids(&["Phi-4-mini-gpu", "phi-4"]);
        assert_eq!(select_model(&available, Some("PHI-4")), "phi-4");
    }

    #[test]
    fn test_select_hardware_order() {
        let available = ids(&["qwen-cpu", "qwen-cuda", "qwen-gpu"]);
        assert_eq!(select_model(&available, Some("qwen")), "qwen-gpu");
    }

    #[test]
    fn test_select_plain_substring() {
        let available = ids(&["phi-4", "mistral-7b-cpu"]);
        assert_eq!(select_model(&available, Some("mistral")), "mistral-7b-cpu");
    }

    #[test]
    fn test_select_falls_back_to_patterns() {
        let available = ids(&["phi-3.5-mini-openvino", "phi-4", "llama-3"]);
        assert_eq!(select_model(&available, Some("nonexistent")), "phi-3.5-mini-openvino");

        let available = ids(&["llama-3", "phi-4-mini"]);
        assert_eq!(select_model(&available, Some("nonexistent")), "phi-4-mini");
    }

    #[test]
    fn test_select_first_when_nothing_matches() {
        let available = ids(&["llama-3", "mistral"]);
        assert_eq!(select_model(&available, None), "llama-3");
    }

    #[test]
    fn test_select_empty_list() {
        assert_eq!(select_model(&[], Some("phi-3.5")), "");
    }
}
