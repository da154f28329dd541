mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use anyhow::Result;
use app::App;
use launcher_core::health::HEALTH_POLL_INTERVAL;
use launcher_core::{Config, Session};
use tracing::{info, warn};
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    let app_dir = Config::app_dir()?;
    let _log_guard = logging::init(&app_dir)?;

    let config_path = Config::get_config_path()?;
    let config = Config::load_from(&config_path).unwrap_or_else(|e| {
        warn!(path = %config_path.display(), error = %e, "unreadable config, using defaults");
        Config::new()
    });
    info!(provider = %config.active_provider(), "starting");

    let (mut session, session_events) = Session::new(config, Some(config_path));
    // The first poll fires immediately, so the status line fills in at startup
    session.start_health_polling(HEALTH_POLL_INTERVAL);

    let mut app = App::new(session);
    let mut events = EventHandler::new(session_events);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    app.session.shutdown();

    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
