use launcher_core::health::HEALTH_POLL_INTERVAL;
use launcher_core::{ChatMessage, Provider, Session, SessionEvent};
use ratatui::widgets::ListState;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// First bubble on screen; display only, never sent to a model
pub const GREETING: &str = "Hey, how are you doing?";

/// How long a toast stays on the status line
const TOAST_TTL: Duration = Duration::from_millis(2500);

/// What the user typed into the input box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Chat(&'a str),
    /// `/file <path>`
    File(&'a str),
    /// `/prefer <model>`; empty clears the preference
    Prefer(&'a str),
    Unknown(&'a str),
}

pub fn parse_command(input: &str) -> Command<'_> {
    let input = input.trim();
    let Some(rest) = input.strip_prefix('/') else {
        return Command::Chat(input);
    };

    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match name {
        "file" => Command::File(arg.trim()),
        "prefer" => Command::Prefer(arg.trim()),
        _ => Command::Unknown(name),
    }
}

/// Resolve a leading `~` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') || rest.starts_with(std::path::MAIN_SEPARATOR) => &rest[1..],
        _ => return PathBuf::from(path),
    };

    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub text: String,
    pub shown_at: Instant,
}

pub struct App {
    pub should_quit: bool,
    pub session: Session,

    // Chat pane
    pub bubbles: Vec<ChatMessage>,
    pub thinking: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub chat_scroll: u16,
    pub chat_height: u16, // inner size of the chat pane, set during render
    pub chat_width: u16,

    // Input box
    pub input: String,
    pub input_cursor: usize, // in chars

    // Status line
    pub status: String,
    pub status_ok: Option<bool>,
    pub toast: Option<Toast>,

    // Provider picker
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // API key popup
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
}

impl App {
    pub fn new(session: Session) -> Self {
        Self {
            should_quit: false,
            session,
            bubbles: vec![ChatMessage::assistant(GREETING)],
            thinking: false,
            animation_frame: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            input: String::new(),
            input_cursor: 0,
            status: "Checking provider...".to_string(),
            status_ok: None,
            toast: None,
            show_provider_picker: false,
            provider_picker_state: ListState::default(),
            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
        }
    }

    /// Reflect a session notification on screen
    pub fn apply_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Queued { position } => self.show_toast(format!("Queued ({})", position)),
            SessionEvent::Working { prompt } => {
                self.bubbles.push(ChatMessage::user(prompt));
                self.thinking = true;
                self.scroll_to_bottom();
            }
            SessionEvent::Reply { text } => {
                self.bubbles.push(ChatMessage::assistant(text));
                self.thinking = false;
                self.scroll_to_bottom();
            }
            SessionEvent::Failed { error } => {
                self.bubbles.push(ChatMessage::assistant(format!("Error: {}", error)));
                self.thinking = false;
                self.show_toast("AI error");
                self.scroll_to_bottom();
            }
            SessionEvent::FileLoaded { name } => {
                self.bubbles
                    .push(ChatMessage::system(format!("Added {} to the conversation", name)));
                self.show_toast(format!("Loaded {}", name));
                self.scroll_to_bottom();
            }
            SessionEvent::Health(status) => {
                self.status = status.summary();
                self.status_ok = Some(status.ok);
            }
        }
    }

    pub fn show_toast(&mut self, text: impl Into<String>) {
        self.toast = Some(Toast {
            text: text.into(),
            shown_at: Instant::now(),
        });
    }

    pub fn tick(&mut self) {
        if self.thinking {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if self.toast.as_ref().is_some_and(|t| t.shown_at.elapsed() >= TOAST_TTL) {
            self.toast = None;
        }
    }

    /// Take the input box contents, leaving it empty
    pub fn take_input(&mut self) -> String {
        self.input_cursor = 0;
        std::mem::take(&mut self.input)
    }

    /// Restart health polling so the status line catches up with a settings change
    pub fn refresh_health(&mut self) {
        self.status = "Checking provider...".to_string();
        self.status_ok = None;
        self.session.start_health_polling(HEALTH_POLL_INTERVAL);
    }

    /// Scroll chat to bottom so the newest bubble (or "Thinking...") is visible
    pub fn scroll_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        let mut total_lines: usize = 0;
        for msg in &self.bubbles {
            total_lines = total_lines.saturating_add(1); // Role line ("You:" or "AI:")
            for line in msg.content.lines() {
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }
        if self.thinking {
            total_lines = total_lines.saturating_add(2);
        }

        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        let hidden = total_lines.saturating_sub(visible_height as usize);
        self.chat_scroll = u16::try_from(hidden).unwrap_or(u16::MAX);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    // Provider picker methods
    pub fn open_provider_picker(&mut self) {
        let current = self.session.active_provider();
        let index = Provider::all().iter().position(|p| *p == current);
        self.provider_picker_state.select(index.or(Some(0)));
        self.show_provider_picker = true;
    }

    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_provider(&self) -> Option<Provider> {
        self.provider_picker_state
            .selected()
            .and_then(|i| Provider::all().get(i).copied())
    }

    pub fn open_api_key_input(&mut self) {
        self.show_provider_picker = false;
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    pub fn close_api_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    /// True when choosing `provider` still needs an API key
    pub fn needs_key(&self, provider: Provider) -> bool {
        !provider.is_local() && self.session.config().openai_key_source().is_none()
    }

    /// What the picker shows next to a provider: its model, preference, or key state
    pub fn provider_detail(&self, provider: Provider) -> String {
        let config = self.session.config();
        let model = config.provider_config_for(provider).model;

        match provider {
            Provider::Ollama => model.unwrap_or_default(),
            Provider::Foundry => match model {
                Some(preference) => format!("prefers {}", preference),
                None => "auto model".to_string(),
            },
            Provider::OpenAI => match config.openai_key_source() {
                Some("env") => format!("{} • key from env", model.unwrap_or_default()),
                Some(_) => format!("{} • key saved", model.unwrap_or_default()),
                None => "needs key".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launcher_core::{Config, HealthStatus, LauncherError};

    fn app() -> App {
        let (session, _rx) = Session::new(Config::new(), None);
        App::new(session)
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  hello there "), Command::Chat("hello there"));
        assert_eq!(parse_command("/file ~/notes.txt"), Command::File("~/notes.txt"));
        assert_eq!(parse_command("/file   my notes.md  "), Command::File("my notes.md"));
        assert_eq!(parse_command("/prefer phi-4"), Command::Prefer("phi-4"));
        assert_eq!(parse_command("/prefer"), Command::Prefer(""));
        assert_eq!(parse_command("/clear"), Command::Unknown("clear"));
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/notes.txt"), home.join("notes.txt"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/tmp/a.txt"), PathBuf::from("/tmp/a.txt"));
        assert_eq!(expand_home("~other/a.txt"), PathBuf::from("~other/a.txt"));
    }

    #[tokio::test]
    async fn test_starts_with_greeting_outside_history() {
        let app = app();
        assert_eq!(app.bubbles, vec![ChatMessage::assistant(GREETING)]);
        assert!(app.session.history().iter().all(|m| m.content != GREETING));
    }

    #[tokio::test]
    async fn test_turn_events_drive_bubbles() {
        let mut app = app();

        app.apply_session_event(SessionEvent::Working { prompt: "hi".into() });
        assert!(app.thinking);
        assert_eq!(app.bubbles.last(), Some(&ChatMessage::user("hi")));

        app.apply_session_event(SessionEvent::Reply { text: "hello".into() });
        assert!(!app.thinking);
        assert_eq!(app.bubbles.last(), Some(&ChatMessage::assistant("hello")));

        app.apply_session_event(SessionEvent::Failed { error: LauncherError::Timeout });
        assert_eq!(
            app.bubbles.last(),
            Some(&ChatMessage::assistant("Error: Request timed out."))
        );
        assert_eq!(app.toast.as_ref().map(|t| t.text.as_str()), Some("AI error"));
    }

    #[tokio::test]
    async fn test_queue_and_health_events() {
        let mut app = app();

        app.apply_session_event(SessionEvent::Queued { position: 2 });
        assert_eq!(app.toast.as_ref().map(|t| t.text.as_str()), Some("Queued (2)"));

        app.apply_session_event(SessionEvent::Health(HealthStatus::failed(Provider::Ollama, "refused")));
        assert_eq!(app.status, "Provider: Local (Ollama) • Not reachable");
        assert_eq!(app.status_ok, Some(false));
    }

    #[tokio::test]
    async fn test_toast_expires_on_tick() {
        let mut app = app();
        app.show_toast("Key saved");
        app.tick();
        assert!(app.toast.is_some());

        app.toast.as_mut().unwrap().shown_at = Instant::now() - TOAST_TTL;
        app.tick();
        assert!(app.toast.is_none());
    }

    #[tokio::test]
    async fn test_scroll_follows_new_bubbles() {
        let mut app = app();
        app.chat_height = 4;
        app.chat_width = 40;

        for i in 0..5 {
            app.apply_session_event(SessionEvent::Reply { text: format!("reply {}", i) });
        }
        // 6 bubbles of 3 lines each
        assert_eq!(app.chat_scroll, 18 - 4);

        app.scroll_up(100);
        assert_eq!(app.chat_scroll, 0);
    }

    #[tokio::test]
    async fn test_provider_details() {
        let app = app();
        assert_eq!(app.provider_detail(Provider::Ollama), "gemma3:4b");
        assert_eq!(app.provider_detail(Provider::Foundry), "auto model");
        assert!(!app.needs_key(Provider::Foundry));

        app.session.set_model_preference("phi-4").unwrap();
        assert_eq!(app.provider_detail(Provider::Foundry), "prefers phi-4");

        app.session.set_credential("sk-test").unwrap();
        assert!(!app.needs_key(Provider::OpenAI));
        assert!(app.provider_detail(Provider::OpenAI).starts_with("gpt-4o-mini • key"));
    }

    #[tokio::test]
    async fn test_very_long_reply_pins_scroll_to_the_end() {
        let mut app = app();
        app.chat_width = 80;
        app.chat_height = 20;

        app.apply_session_event(SessionEvent::Reply { text: "x\n".repeat(70_000) });
        assert_eq!(app.chat_scroll, u16::MAX);

        app.scroll_down(10);
        assert_eq!(app.chat_scroll, u16::MAX);
    }

    #[tokio::test]
    async fn test_provider_picker_starts_on_active_provider() {
        let mut app = app();
        app.open_provider_picker();
        assert_eq!(app.selected_provider(), Some(Provider::Ollama));

        app.provider_picker_nav_down();
        app.provider_picker_nav_down();
        app.provider_picker_nav_down();
        assert_eq!(app.selected_provider(), Provider::all().last().copied());
    }
}
