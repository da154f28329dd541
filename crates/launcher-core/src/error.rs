use std::time::Duration;
use thiserror::Error;

use crate::send_view::clip_text;

/// Longest HTTP error body kept on a `LauncherError::Http`
pub const HTTP_BODY_EXCERPT_CHARS: usize = 500;
/// Longest unparseable body kept on a `LauncherError::MalformedResponse`
pub const MALFORMED_EXCERPT_CHARS: usize = 300;

/// Failure of a single provider call.
///
/// None of these are fatal; the worst outcome is one failed chat turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LauncherError {
    #[error("Could not reach provider: {0}")]
    Unreachable(String),

    #[error("Request timed out.")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Bad JSON: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, LauncherError>;

impl LauncherError {
    pub fn http(status: u16, body: &str) -> Self {
        LauncherError::Http {
            status,
            body: clip_text(body, HTTP_BODY_EXCERPT_CHARS),
        }
    }

    pub fn malformed(body: &str) -> Self {
        LauncherError::MalformedResponse(clip_text(body, MALFORMED_EXCERPT_CHARS))
    }

    pub fn config(detail: impl Into<String>) -> Self {
        LauncherError::Configuration(detail.into())
    }

    /// Short machine-friendly name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            LauncherError::Unreachable(_) => "unreachable",
            LauncherError::Timeout => "timeout",
            LauncherError::Http { .. } => "http",
            LauncherError::MalformedResponse(_) => "malformed",
            LauncherError::Configuration(_) => "configuration",
        }
    }
}

impl From<reqwest::Error> for LauncherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LauncherError::Timeout
        } else if err.is_builder() {
            LauncherError::Configuration(format!("Invalid request: {}", err))
        } else if err.is_decode() {
            LauncherError::malformed(&err.to_string())
        } else if let Some(status) = err.status() {
            LauncherError::http(status.as_u16(), &err.to_string())
        } else {
            LauncherError::Unreachable(err.to_string())
        }
    }
}

/// Run `fut` under `limit`, mapping an elapsed deadline to `Timeout`.
///
/// Dropping the inner future aborts whatever request it was driving.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LauncherError::Timeout),
    }
}
