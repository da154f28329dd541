use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::App;
use launcher_core::{ChatRole, Provider};

/// Render `**bold**` runs; everything else is literal
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if end == 0 {
            // "****" has nothing to embolden
            spans.push(Span::raw(rest[..start + 4].to_string()));
            rest = &after[2..];
            continue;
        }

        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after[..end].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Mask an API key, showing only the last four characters
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        "*".repeat(len)
    } else {
        let last_four: String = key.chars().skip(len - 4).collect();
        format!("{}...{}", "*".repeat((len - 4).min(20)), last_four)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, status, input, footer
    let [header_area, chat_area, status_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_status(app, frame, status_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Popups
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    } else if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" AI Launcher ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  "),
        Span::styled(
            app.session.active_provider().display_name(),
            Style::default().fg(Color::White),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Chat ");

    let mut lines: Vec<Line> = Vec::new();
    for msg in &app.bubbles {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
            ChatRole::System => {
                lines.push(Line::from(Span::styled(
                    "Note:",
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(Span::styled(
                    msg.content.clone(),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
        }
        lines.push(Line::default());
    }

    if app.thinking {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let status_color = match app.status_ok {
        Some(true) => Color::Green,
        Some(false) => Color::Red,
        None => Color::DarkGray,
    };

    let mut spans = vec![Span::styled(
        format!(" {}", app.status),
        Style::default().fg(status_color),
    )];
    if let Some(toast) = &app.toast {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!(" {} ", toast.text),
            Style::default().bg(Color::Yellow).fg(Color::Black),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let title = if app.session.is_busy() {
        " Message (sending; new messages queue) "
    } else {
        " Message "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);

    // Horizontal scrolling to keep the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width > 0 && cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if !app.show_api_key_input && !app.show_provider_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::White);

    let hints: &[(&str, &str)] = if app.show_api_key_input {
        &[("Enter", "save"), ("Esc", "cancel")]
    } else if app.show_provider_picker {
        &[("j/k", "move"), ("Enter", "select"), ("Esc", "close")]
    } else {
        &[
            ("Enter", "send"),
            ("^P", "provider"),
            ("^K", "API key"),
            ("/file", "add file"),
            ("/prefer", "model"),
            ("PgUp/PgDn", "scroll"),
            ("^C", "quit"),
        ]
    };

    let mut spans = Vec::new();
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let providers = Provider::all();
    let current = app.session.active_provider();

    // Centered popup
    let popup_width = 56.min(area.width.saturating_sub(4));
    let popup_height = (providers.len() as u16 + 2).min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Provider ");

    let items: Vec<ListItem> = providers
        .iter()
        .map(|&provider| {
            // The active provider carries the latest health result
            let (marker, marker_style) = if provider != current {
                ("  ", Style::default())
            } else {
                match app.status_ok {
                    Some(true) => ("● ", Style::default().fg(Color::Green)),
                    Some(false) => ("● ", Style::default().fg(Color::Red)),
                    None => ("○ ", Style::default().fg(Color::DarkGray)),
                }
            };

            let name_style = if provider == current {
                Style::default().add_modifier(Modifier::BOLD)
            } else if app.needs_key(provider) {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };

            ListItem::new(Line::from(vec![
                Span::styled(marker, marker_style),
                Span::styled(provider.display_name(), name_style),
                Span::raw("  "),
                Span::styled(app.provider_detail(provider), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.provider_picker_state);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Enter API Key for OpenAI ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your API key below. Press Enter to save, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let input = Paragraph::new(mask_key(&app.api_key_input)).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let char_count = format!("{} characters", app.api_key_input.chars().count());
    let status = Paragraph::new(char_count).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}
