use crate::send_view::{build_send_view, SendLimits};
use crate::state::{ChatMessage, ChatRole};

/// Instruction preamble every new conversation starts with
pub const DEFAULT_PREAMBLE: &str =
    "You are a helpful desktop assistant. Be friendly, modern, and practical. Keep answers tight.";

/// Full, untrimmed chat history for one session.
///
/// Append-only; trimming only ever happens on the copy built by
/// [`Conversation::send_view`].
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(preamble: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(preamble)],
        }
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn preamble(&self) -> Option<&ChatMessage> {
        self.messages.first().filter(|m| m.role == ChatRole::System)
    }

    pub fn send_view(&self, limits: &SendLimits) -> Vec<ChatMessage> {
        build_send_view(&self.messages, limits)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}
