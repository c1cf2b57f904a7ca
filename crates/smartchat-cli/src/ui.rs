//! UI rendering with ratatui.
//!
//! Join screen: a centered form. Room screen: chat column on the left, online
//! users on the right.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use ratatui::Frame;

use smartchat_client::{ConnectionState, Field};
use smartchat_core::AI_USERNAME;

use crate::app::{App, FormField, Screen, TextInput};

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 2;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header bar
            Constraint::Min(5),    // Screen
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);

    match app.screen {
        Screen::Join => render_join_form(frame, app, main_layout[1]),
        Screen::Room => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
                .split(main_layout[1]);
            render_chat_column(frame, app, columns[0]);
            render_users_panel(frame, app, columns[1]);
        }
    }

    render_status_bar(frame, app, main_layout[2]);
}

fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Truncate a string in the middle with an ellipsis if it exceeds `max_len` chars.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

const fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Disconnected => Color::Gray,
        ConnectionState::Error => Color::Red,
    }
}

/// Render the header bar with the server endpoint and connection state.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.client.connection_state();
    let status_text = state.as_str();

    let title = "SMARTCHAT";
    let max_url_width = (area.width as usize / 2).saturating_sub(15);
    let display_url = truncate_middle(app.endpoint(), max_url_width);

    let right_width = display_url.chars().count() + status_text.len() + 3;
    let padding = (area.width as usize).saturating_sub(title.len() + right_width);

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(padding)),
        Span::raw(display_url),
        Span::raw(" ["),
        Span::styled(status_text, Style::default().fg(state_color(state))),
        Span::raw("]"),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

// =============================================================================
// Join Screen
// =============================================================================

fn render_join_form(frame: &mut Frame, app: &App, area: Rect) {
    let width = 50.min(area.width.saturating_sub(4));
    let height = 14.min(area.height);
    let dialog_area = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    );

    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Join a room ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Username
            Constraint::Length(1), // Username error
            Constraint::Length(3), // Room
            Constraint::Length(1), // Room error
            Constraint::Length(1), // Submit error
            Constraint::Length(1), // Help
        ])
        .split(inner);

    render_form_field(frame, app, FormField::Username, " Username ", &app.username, layout[0]);
    render_field_error(frame, app, Field::Username, layout[1]);
    render_form_field(frame, app, FormField::Room, " Room ", &app.room, layout[2]);
    render_field_error(frame, app, Field::Room, layout[3]);
    render_field_error(frame, app, Field::Submit, layout[4]);

    let help = Paragraph::new(Line::from(vec![
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(":join "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(":next field "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(":quit"),
    ]))
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, layout[5]);
}

fn render_form_field(
    frame: &mut Frame,
    app: &App,
    field: FormField,
    title: &str,
    input: &TextInput,
    area: Rect,
) {
    let focused = app.field == field;
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let paragraph = Paragraph::new(input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(block);
    frame.render_widget(paragraph, area);

    if focused {
        frame.set_cursor_position((area.x + 1 + to_u16(input.cursor()), area.y + 1));
    }
}

fn render_field_error(frame: &mut Frame, app: &App, field: Field, area: Rect) {
    if let Some(message) = app.form_errors.get(&field) {
        let error = Paragraph::new(format!(" {message}")).style(Style::default().fg(Color::Red));
        frame.render_widget(error, area);
    }
}

// =============================================================================
// Room Screen
// =============================================================================

/// Render the chat column: messages, indicators and the input line.
fn render_chat_column(frame: &mut Frame, app: &App, area: Rect) {
    let session = app.client.session();
    let title = format!(" Room: {} ", session.room.as_deref().unwrap_or("?"));

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Messages
            Constraint::Length(1), // Typing indicator
            Constraint::Length(1), // Separator
            Constraint::Length(1), // Input
        ])
        .split(inner_area);

    let chat_area_full = inner_layout[0];
    let chat_area = Rect::new(
        chat_area_full.x + CHAT_PADDING,
        chat_area_full.y,
        chat_area_full.width.saturating_sub(CHAT_PADDING * 2 + 1),
        chat_area_full.height,
    );

    let messages = app.client.room_messages();
    let ai_busy = app.client.ai().is_some_and(|ai| ai.is_busy());

    if messages.is_empty() && !ai_busy {
        let help = Paragraph::new("No messages yet. Type /ai <question> to ask the assistant")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(help, chat_area);
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for message in &messages {
            let (label, color) = if message.is_from_ai() {
                (format!("[{AI_USERNAME}] "), Color::Magenta)
            } else if session.username.as_deref() == Some(message.sender.as_str()) {
                ("[You] ".to_string(), Color::Cyan)
            } else {
                (format!("[{}] ", message.sender), Color::Green)
            };
            lines.push(Line::from(vec![
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::styled(message.body.clone(), Style::default().fg(Color::White)),
            ]));
        }

        if ai_busy {
            lines.push(Line::from(vec![
                Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
                Span::styled(" AI is thinking...", Style::default().fg(Color::DarkGray)),
            ]));
        }

        render_scrolled(frame, app, Text::from(lines), chat_area, chat_area_full);
    }

    if let Some(typer) = app.client.typing().and_then(|t| t.active_typer().map(str::to_owned)) {
        let indicator = Paragraph::new(format!("  {typer} is typing..."))
            .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC));
        frame.render_widget(indicator, inner_layout[1]);
    }

    render_input_line(frame, app, inner_layout[2], inner_layout[3]);
}

fn render_scrolled(frame: &mut Frame, app: &App, text: Text, area: Rect, scrollbar_area: Rect) {
    let visible_lines = area.height as usize;
    let total_lines = calculate_wrapped_line_count(&text, area.width as usize);

    // chat_scroll counts from the bottom; Paragraph scrolls from the top.
    let max_scroll = total_lines.saturating_sub(visible_lines);
    let effective_scroll = app.chat_scroll.min(max_scroll);
    let offset = max_scroll.saturating_sub(effective_scroll);

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .scroll((to_u16(offset), 0));
    frame.render_widget(paragraph, area);

    if total_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut state = ScrollbarState::new(total_lines)
            .position(offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut state);
    }
}

fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect) {
    let ai_mode = app.ai_mode();

    let separator = if ai_mode {
        let banner = " AI mode: Enter asks the assistant ";
        let rest = (separator_area.width as usize).saturating_sub(banner.chars().count() + 2);
        Line::from(vec![
            Span::styled("──", Style::default().fg(Color::Magenta)),
            Span::styled(banner, Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)),
            Span::styled("─".repeat(rest), Style::default().fg(Color::Magenta)),
        ])
    } else {
        Line::styled(
            "─".repeat(separator_area.width as usize),
            Style::default().fg(Color::DarkGray),
        )
    };
    frame.render_widget(Paragraph::new(separator), separator_area);

    let ready = app.client.can_submit();
    let (prompt, prompt_color) = match (ready, ai_mode) {
        (false, _) => ("… ", Color::DarkGray),
        (true, true) => ("? ", Color::Magenta),
        (true, false) => ("> ", Color::Cyan),
    };

    let mut spans = vec![
        Span::styled(prompt, Style::default().fg(prompt_color)),
        Span::styled(
            app.input.as_str(),
            Style::default().fg(if ai_mode { Color::Magenta } else { Color::White }),
        ),
    ];
    if ai_mode && app.ai_prompt_is_empty() {
        spans.push(Span::styled(" Ask AI...", Style::default().fg(Color::DarkGray)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), input_area);

    frame.set_cursor_position((input_area.x + 2 + to_u16(app.input.cursor()), input_area.y));
}

/// Render the online users panel.
fn render_users_panel(frame: &mut Frame, app: &App, area: Rect) {
    let own = app.client.session().username;
    let users: Vec<String> = app
        .client
        .presence()
        .map(|presence| presence.sorted().into_iter().map(str::to_owned).collect())
        .unwrap_or_default();

    let items: Vec<ListItem> = users
        .iter()
        .map(|user| {
            if user == AI_USERNAME {
                ListItem::new(Span::styled(user.as_str(), Style::default().fg(Color::Magenta)))
            } else if own.as_deref() == Some(user.as_str()) {
                ListItem::new(Line::from(vec![
                    Span::styled(user.as_str(), Style::default().fg(Color::Cyan)),
                    Span::styled(" (you)", Style::default().fg(Color::DarkGray)),
                ]))
            } else {
                ListItem::new(Span::raw(user.as_str()))
            }
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Online ({}) ", users.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Gray)),
    );
    frame.render_widget(list, area);
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = match app.screen {
        Screen::Join => Span::styled(" JOIN ", Style::default().fg(Color::Black).bg(Color::Magenta)),
        Screen::Room => Span::styled(" ROOM ", Style::default().fg(Color::Black).bg(Color::Green)),
    };

    let status = if let Some(ref error) = app.error_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()),
            Span::styled(error.as_str(), Style::default().fg(Color::Red)),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(format!(" {status}"), Style::default().fg(Color::Green)),
        ])
    } else if app.screen == Screen::Room {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":send "),
            Span::styled("/ai", Style::default().fg(Color::Yellow)),
            Span::raw(":ask "),
            Span::styled("/leave", Style::default().fg(Color::Yellow)),
            Span::raw(":leave "),
            Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
            Span::raw(":scroll"),
        ])
    } else {
        Line::from(vec![mode_indicator])
    };

    frame.render_widget(
        Paragraph::new(status).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

/// Number of visual lines after wrapping.
fn calculate_wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }

    text.lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_urls_in_the_middle() {
        assert_eq!(truncate_middle("http://localhost:3000", 40), "http://localhost:3000");
        assert_eq!(truncate_middle("https://chat.example.com", 11), "http....com");
    }

    #[test]
    fn wrapped_lines_count_empty_lines() {
        let text = Text::from(vec![Line::from(""), Line::from("abcdefghij")]);
        assert_eq!(calculate_wrapped_line_count(&text, 4), 4);
    }
}
