use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tracing::warn;
use crate::app::{expand_home, parse_command, App, Command};
use crate::tui::AppEvent;

/// Lines moved per PageUp/PageDown
const PAGE_LINES: u16 = 10;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Cursor editing shared by the input box and the API key popup.
/// Returns false when the key is not an editing key.
fn edit_line(text: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(text.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = text.chars().count(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => app.scroll_to_bottom(),
        AppEvent::Tick => app.tick(),
        AppEvent::Session(event) => app.apply_session_event(event),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work everywhere
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return Ok(());
    }

    if app.show_api_key_input {
        handle_api_key_input(app, key);
    } else if app.show_provider_picker {
        handle_provider_picker(app, key);
    } else {
        match key.code {
            KeyCode::Char('p') if ctrl => app.open_provider_picker(),
            KeyCode::Char('k') if ctrl => app.open_api_key_input(),
            KeyCode::Enter => submit_input(app).await,
            KeyCode::PageUp => app.scroll_up(PAGE_LINES),
            KeyCode::PageDown => app.scroll_down(PAGE_LINES),
            KeyCode::Esc => {
                app.take_input();
            }
            _ => {
                edit_line(&mut app.input, &mut app.input_cursor, key);
            }
        }
    }

    Ok(())
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_api_key_input(),
        KeyCode::Enter => match app.session.set_credential(&app.api_key_input) {
            Ok(()) => {
                app.close_api_key_input();
                app.show_toast("Key saved");
                app.refresh_health();
            }
            Err(e) => {
                warn!(error = %e, "could not save key");
                app.show_toast(e.to_string());
            }
        },
        _ => {
            edit_line(&mut app.api_key_input, &mut app.api_key_input_cursor, key);
        }
    }
}

fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_provider_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.provider_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.provider_picker_nav_up(),
        KeyCode::Enter => {
            let Some(provider) = app.selected_provider() else {
                return;
            };

            app.show_provider_picker = false;
            if let Err(e) = app.session.set_active_provider(provider) {
                warn!(error = %e, "could not save provider");
                app.show_toast(format!("Could not save settings: {}", e));
                return;
            }
            app.show_toast("Provider updated");
            app.refresh_health();

            // Cloud provider without a key: ask for one right away
            if app.needs_key(provider) {
                app.open_api_key_input();
            }
        }
        _ => {}
    }
}

/// Send the input box contents, or run it as a slash command
async fn submit_input(app: &mut App) {
    let input = app.take_input();

    match parse_command(&input) {
        Command::Chat(text) => {
            // Queue position and the reply come back as session events
            app.session.submit(text);
        }
        Command::File("") => app.show_toast("Usage: /file <path>"),
        Command::File(path) => {
            if let Err(e) = app.session.ingest_file(&expand_home(path)).await {
                warn!(path, error = %e, "file not added");
                app.show_toast(format!("Could not read {}: {}", path, e));
            }
        }
        Command::Prefer(model) => match app.session.set_model_preference(model) {
            Ok(()) => {
                if model.is_empty() {
                    app.show_toast("Model preference cleared");
                } else {
                    app.show_toast(format!("Preferring {}", model));
                }
                app.refresh_health();
            }
            Err(e) => app.show_toast(e.to_string()),
        },
        Command::Unknown(name) => app.show_toast(format!("Unknown command: /{}", name)),
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launcher_core::{Config, Provider, Session};
    use tempfile::TempDir;

    fn app() -> App {
        let (session, _rx) = Session::new(Config::new(), None);
        App::new(session)
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).await.unwrap();
        }
    }

    #[test]
    fn test_edit_line_is_utf8_safe() {
        let mut text = "héllo".to_string();
        let mut cursor = 2;

        edit_line(&mut text, &mut cursor, KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE));
        assert_eq!(text, "hllo");
        assert_eq!(cursor, 1);

        edit_line(&mut text, &mut cursor, KeyEvent::new(KeyCode::Char('é'), KeyModifiers::NONE));
        edit_line(&mut text, &mut cursor, KeyEvent::new(KeyCode::End, KeyModifiers::NONE));
        edit_line(&mut text, &mut cursor, KeyEvent::new(KeyCode::Char('!'), KeyModifiers::NONE));
        assert_eq!(text, "héllo!");
        assert_eq!(cursor, 6);
    }

    #[tokio::test]
    async fn test_ctrl_c_quits() {
        let mut app = app();
        handle_event(&mut app, ctrl('c')).await.unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_prefer_command_updates_settings() {
        let mut app = app();
        type_text(&mut app, "/prefer phi-3.5").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();

        assert!(app.input.is_empty());
        assert_eq!(app.session.config().foundry_prefer.as_deref(), Some("phi-3.5"));
        assert_eq!(app.toast.as_ref().map(|t| t.text.as_str()), Some("Preferring phi-3.5"));
    }

    #[tokio::test]
    async fn test_file_command_adds_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.txt");
        std::fs::write(&path, "ship it").unwrap();

        let mut app = app();
        type_text(&mut app, &format!("/file {}", path.display())).await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();

        let history = app.session.history();
        assert!(history.last().unwrap().content.contains("ship it"));
    }

    #[tokio::test]
    async fn test_missing_file_shows_toast() {
        let mut app = app();
        type_text(&mut app, "/file /definitely/not/here.txt").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.session.history().len(), 1);
        assert!(app.toast.as_ref().unwrap().text.starts_with("Could not read"));
    }

    #[tokio::test]
    async fn test_provider_picker_switches_provider() {
        let mut app = app();
        handle_event(&mut app, ctrl('p')).await.unwrap();
        assert!(app.show_provider_picker);

        handle_event(&mut app, key(KeyCode::Down)).await.unwrap();
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();

        assert!(!app.show_provider_picker);
        assert_eq!(app.session.active_provider(), Provider::Foundry);
        assert_eq!(app.toast.as_ref().map(|t| t.text.as_str()), Some("Provider updated"));
    }

    #[tokio::test]
    async fn test_api_key_popup_rejects_blank_and_saves_key() {
        let mut app = app();
        handle_event(&mut app, ctrl('k')).await.unwrap();
        assert!(app.show_api_key_input);

        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert!(app.show_api_key_input);
        assert_eq!(app.toast.as_ref().map(|t| t.text.as_str()), Some("Paste your key first"));

        type_text(&mut app, "sk-abc").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert!(!app.show_api_key_input);
        assert_eq!(app.session.config().openai_api_key.as_deref(), Some("sk-abc"));
        assert_eq!(app.toast.as_ref().map(|t| t.text.as_str()), Some("Key saved"));
    }

    #[tokio::test]
    async fn test_blank_input_sends_nothing() {
        let mut app = app();
        type_text(&mut app, "   ").await;
        handle_event(&mut app, key(KeyCode::Enter)).await.unwrap();
        assert!(!app.session.is_busy());
        assert_eq!(app.session.history().len(), 1);
    }
}
