//! Single-flight send queue.
//!
//! At most one dispatch runs at a time. Messages submitted while one is
//! running wait in a FIFO backlog and are sent, in order, once it ends.
//! A running dispatch cannot be cancelled; it always runs to success,
//! failure, or timeout before the next backlog item starts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::conversation::Conversation;
use crate::dispatcher::Dispatch;
use crate::events::SessionEvent;
use crate::send_view::SendLimits;
use crate::state::ChatMessage;

/// Pause between one dispatch finishing and the next backlog item starting
pub const PACING_DELAY: Duration = Duration::from_millis(120);

/// What `submit` did with the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Dispatched right away
    Started,
    /// Waiting behind the running dispatch, 1-based
    Queued { position: usize },
    /// Blank input, nothing to send
    Ignored,
}

#[derive(Default)]
struct Backlog {
    in_flight: bool,
    pending: VecDeque<String>,
}

struct Shared<D> {
    dispatcher: Arc<D>,
    conversation: Arc<Mutex<Conversation>>,
    backlog: Mutex<Backlog>,
    limits: SendLimits,
    pacing: Duration,
    events: UnboundedSender<SessionEvent>,
}

pub struct SendQueue<D> {
    shared: Arc<Shared<D>>,
}

impl<D> Clone for SendQueue<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: Dispatch + 'static> SendQueue<D> {
    pub fn new(
        dispatcher: Arc<D>,
        conversation: Arc<Mutex<Conversation>>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self::with_settings(dispatcher, conversation, events, SendLimits::default(), PACING_DELAY)
    }

    pub fn with_settings(
        dispatcher: Arc<D>,
        conversation: Arc<Mutex<Conversation>>,
        events: UnboundedSender<SessionEvent>,
        limits: SendLimits,
        pacing: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher,
                conversation,
                backlog: Mutex::new(Backlog::default()),
                limits,
                pacing,
                events,
            }),
        }
    }

    /// Send `text` now, or queue it behind the running dispatch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, text: &str) -> Submission {
        let text = text.trim();
        if text.is_empty() {
            return Submission::Ignored;
        }

        {
            let mut backlog = self.shared.lock_backlog();
            if backlog.in_flight {
                backlog.pending.push_back(text.to_string());
                let position = backlog.pending.len();
                drop(backlog);

                debug!(position, "message queued");
                let _ = self.shared.events.send(SessionEvent::Queued { position });
                return Submission::Queued { position };
            }
            backlog.in_flight = true;
        }

        let shared = Arc::clone(&self.shared);
        let first = text.to_string();
        tokio::spawn(async move { shared.drain(first).await });

        Submission::Started
    }

    pub fn is_busy(&self) -> bool {
        self.shared.lock_backlog().in_flight
    }

    pub fn pending(&self) -> usize {
        self.shared.lock_backlog().pending.len()
    }
}

impl<D: Dispatch> Shared<D> {
    fn lock_backlog(&self) -> std::sync::MutexGuard<'_, Backlog> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `first`, then keep taking from the backlog until it is empty
    async fn drain(&self, first: String) {
        let mut next = Some(first);

        while let Some(text) = next {
            self.run_turn(text).await;

            next = {
                let mut backlog = self.lock_backlog();
                let item = backlog.pending.pop_front();
                if item.is_none() {
                    backlog.in_flight = false;
                }
                item
            };

            if next.is_some() {
                tokio::time::sleep(self.pacing).await;
            }
        }
    }

    /// One user turn: record the prompt, ask, record the outcome
    async fn run_turn(&self, text: String) {
        let view = {
            let mut conversation = self.conversation.lock().unwrap_or_else(PoisonError::into_inner);
            conversation.append(ChatMessage::user(text.clone()));
            conversation.send_view(&self.limits)
        };

        let _ = self.events.send(SessionEvent::Working { prompt: text });

        let result = self.dispatcher.ask(&view).await;

        let reply = match &result {
            Ok(reply) => reply.clone(),
            Err(e) => format!("Error: {}", e),
        };
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(ChatMessage::assistant(reply));

        let event = match result {
            Ok(text) => SessionEvent::Reply { text },
            Err(error) => {
                info!(kind = error.kind(), "turn failed");
                SessionEvent::Failed { error }
            }
        };
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LauncherError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    /// Echoes the newest message after a delay, tracking overlap
    struct SlowEcho {
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowEcho {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Dispatch for SlowEcho {
        async fn ask(&self, view: &[ChatMessage]) -> Result<String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let last = view.last().map(|m| m.content.clone()).unwrap_or_default();
            if last == "fail" {
                Err(LauncherError::Timeout)
            } else {
                Ok(format!("echo {}", last))
            }
        }
    }

    fn queue_with(
        dispatcher: Arc<SlowEcho>,
    ) -> (SendQueue<SlowEcho>, Arc<Mutex<Conversation>>, UnboundedReceiver<SessionEvent>) {
        let conversation = Arc::new(Mutex::new(Conversation::new("be concise")));
        let (tx, rx) = unbounded_channel();
        let queue = SendQueue::with_settings(
            dispatcher,
            Arc::clone(&conversation),
            tx,
            SendLimits::default(),
            Duration::from_millis(1),
        );
        (queue, conversation, rx)
    }

    async fn next_outcome(rx: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
        loop {
            match rx.recv().await.expect("channel open") {
                event @ (SessionEvent::Reply { .. } | SessionEvent::Failed { .. }) => return event,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let (queue, conversation, _rx) = queue_with(Arc::new(SlowEcho::new(Duration::ZERO)));
        assert_eq!(queue.submit("   \n"), Submission::Ignored);
        assert!(!queue.is_busy());
        assert_eq!(conversation.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rapid_submits_are_fifo_and_single_flight() {
        let dispatcher = Arc::new(SlowEcho::new(Duration::from_millis(30)));
        let (queue, conversation, mut rx) = queue_with(Arc::clone(&dispatcher));

        assert_eq!(queue.submit("one"), Submission::Started);
        assert_eq!(queue.submit("two"), Submission::Queued { position: 1 });
        assert_eq!(queue.submit("three"), Submission::Queued { position: 2 });
        assert_eq!(queue.submit("four"), Submission::Queued { position: 3 });
        assert_eq!(queue.pending(), 3);

        for expected in ["echo one", "echo two", "echo three", "echo four"] {
            assert_eq!(
                next_outcome(&mut rx).await,
                SessionEvent::Reply { text: expected.to_string() }
            );
        }

        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 4);
        assert_eq!(dispatcher.max_active.load(Ordering::SeqCst), 1);

        let history = conversation.lock().unwrap().messages().to_vec();
        let contents: Vec<&str> = history.iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["one", "echo one", "two", "echo two", "three", "echo three", "four", "echo four"]
        );
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_queue_moves_on() {
        let (queue, conversation, mut rx) = queue_with(Arc::new(SlowEcho::new(Duration::from_millis(10))));

        queue.submit("fail");
        queue.submit("after");

        assert_eq!(
            next_outcome(&mut rx).await,
            SessionEvent::Failed { error: LauncherError::Timeout }
        );
        assert_eq!(
            next_outcome(&mut rx).await,
            SessionEvent::Reply { text: "echo after".to_string() }
        );

        let history = conversation.lock().unwrap().messages().to_vec();
        assert_eq!(history[2], ChatMessage::assistant("Error: Request timed out."));
        assert_eq!(history[4], ChatMessage::assistant("echo after"));
    }

    #[tokio::test]
    async fn test_becomes_idle_after_draining() {
        let (queue, _conversation, mut rx) = queue_with(Arc::new(SlowEcho::new(Duration::from_millis(5))));

        queue.submit("only");
        next_outcome(&mut rx).await;

        // The flag is cleared just after the last event is sent
        for _ in 0..50 {
            if !queue.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(!queue.is_busy());
        assert_eq!(queue.submit("again"), Submission::Started);
    }
}
