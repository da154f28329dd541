use crate::error::LauncherError;
use crate::health::HealthStatus;

/// Notifications from a session to whatever front-end is listening
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message was put on the backlog behind the running dispatch
    Queued { position: usize },
    /// A dispatch started for this user text; show a working placeholder
    Working { prompt: String },
    /// The running dispatch finished with a reply
    Reply { text: String },
    /// The running dispatch failed; the error was stored as the reply
    Failed { error: LauncherError },
    /// A file was added to the conversation as context
    FileLoaded { name: String },
    Health(HealthStatus),
}
