pub mod ai;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod health;
pub mod ingest;
pub mod provider;
pub mod queue;
pub mod send_view;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{ChatProvider, FoundryClient, OllamaClient, OpenAIClient};
pub use config::Config;
pub use conversation::Conversation;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::LauncherError;
pub use events::SessionEvent;
pub use health::HealthStatus;
pub use provider::{Endpoint, Provider, ProviderConfig};
pub use queue::{SendQueue, Submission};
pub use send_view::{build_send_view, SendLimits};
pub use session::Session;
pub use state::{ChatMessage, ChatRole};
