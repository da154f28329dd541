//! The application context: one conversation, one dispatcher, one send
//! queue, and the settings they share. Created at startup, dropped at
//! shutdown.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::conversation::Conversation;
use crate::dispatcher::Dispatcher;
use crate::error::LauncherError;
use crate::events::SessionEvent;
use crate::health::{spawn_health_poller, HealthStatus};
use crate::ingest::read_file_context;
use crate::provider::Provider;
use crate::queue::{SendQueue, Submission};
use crate::state::ChatMessage;

const MAX_PREFERENCE_CHARS: usize = 128;

pub struct Session {
    dispatcher: Arc<Dispatcher>,
    conversation: Arc<Mutex<Conversation>>,
    queue: SendQueue<Dispatcher>,
    events: UnboundedSender<SessionEvent>,
    config_path: Option<PathBuf>,
    health_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Build a session. Settings changes are written to `config_path` when given.
    pub fn new(config: Config, config_path: Option<PathBuf>) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, rx) = unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(config));
        let conversation = Arc::new(Mutex::new(Conversation::default()));
        let queue = SendQueue::new(Arc::clone(&dispatcher), Arc::clone(&conversation), events.clone());

        let session = Self {
            dispatcher,
            conversation,
            queue,
            events,
            config_path,
            health_task: None,
        };
        (session, rx)
    }

    pub fn submit(&self, text: &str) -> Submission {
        self.queue.submit(text)
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    pub async fn check_health(&self) -> HealthStatus {
        self.dispatcher.check_health().await
    }

    /// Start publishing `SessionEvent::Health` every `every`; replaces any running poller
    pub fn start_health_polling(&mut self, every: Duration) {
        if let Some(task) = self.health_task.take() {
            task.abort();
        }
        self.health_task = Some(spawn_health_poller(
            Arc::clone(&self.dispatcher),
            every,
            self.events.clone(),
        ));
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock_conversation().messages().to_vec()
    }

    pub fn append(&self, message: ChatMessage) {
        self.lock_conversation().append(message);
    }

    pub fn config(&self) -> Config {
        self.dispatcher.config()
    }

    pub fn active_provider(&self) -> Provider {
        self.dispatcher.active_provider()
    }

    pub fn set_active_provider(&self, kind: Provider) -> Result<()> {
        let config = self
            .dispatcher
            .update_config(|c| c.provider = Some(kind.as_str().to_string()));
        info!(provider = %kind, "provider switched");
        self.persist(&config)
    }

    pub fn set_credential(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LauncherError::config("Paste your key first").into());
        }

        let config = self
            .dispatcher
            .update_config(|c| c.openai_api_key = Some(key.to_string()));
        info!("openai key updated");
        self.persist(&config)
    }

    /// Set the preferred local model; an empty string clears it
    pub fn set_model_preference(&self, preference: &str) -> Result<()> {
        let preference = preference.trim();
        if preference.chars().count() > MAX_PREFERENCE_CHARS || preference.chars().any(char::is_control) {
            return Err(LauncherError::config(format!("Invalid model preference: {:?}", preference)).into());
        }

        let value = (!preference.is_empty()).then(|| preference.to_string());
        let config = self.dispatcher.update_config(|c| c.foundry_prefer = value);
        self.persist(&config)
    }

    /// Add a text file to the conversation as system context, returning its name
    pub async fn ingest_file(&self, path: &Path) -> Result<String> {
        let (name, message) = read_file_context(path).await?;
        self.append(message);

        info!(file = %name, "file added to conversation");
        let _ = self.events.send(SessionEvent::FileLoaded { name: name.clone() });
        Ok(name)
    }

    pub fn shutdown(mut self) {
        if let Some(task) = self.health_task.take() {
            task.abort();
        }
        info!(messages = self.lock_conversation().len(), "session closed");
    }

    fn lock_conversation(&self) -> std::sync::MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, config: &Config) -> Result<()> {
        match &self.config_path {
            Some(path) => config.save_to(path),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.health_task.take() {
            task.abort();
        }
    }
}
