//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use crate::engine::Side;
use crate::models::SessionPhase;

use super::app::App;
use super::compose;
use super::messages;

/// Status symbol and color for the session phase.
fn phase_indicator(phase: SessionPhase) -> (&'static str, Color) {
    match phase {
        SessionPhase::Live => ("*", Color::Green),
        SessionPhase::Loading => ("~", Color::Yellow),
        SessionPhase::Idle | SessionPhase::Closing => ("o", Color::Red),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    // Layout: header (1 line) + messages + compose box + status bar (1 line)
    let [header_area, messages_area, compose_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(header_area, frame.buffer_mut(), app);
    messages::render(messages_area, frame.buffer_mut(), &app.view, &app.messages);
    compose::render(compose_area, frame, &app.compose, app.conversation.as_str());
    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = format!(" Conversation {}", app.conversation);
    let (symbol, color) = phase_indicator(app.view.phase);
    let right = format!(" {} {}  as {} ", symbol, app.view.phase.as_str(), app.operator);

    let padding = (area.width as usize).saturating_sub(title.len() + right.len());
    let line = Line::from(vec![
        Span::styled(
            title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(right, Style::default().fg(color)),
    ]);

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    // A pending notice wins over the key hints.
    if let Some(ref msg) = app.status_message {
        let style = if app.status_is_error {
            Style::default().fg(Color::Red).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Green).bg(Color::DarkGray)
        };
        Paragraph::new(Line::from(Span::styled(format!(" {} ", msg), style)))
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let hint = Style::default().fg(Color::Gray);
    let sep = Span::styled(" | ", Style::default().fg(Color::Black));
    let mut spans = vec![
        Span::styled(format!(" {} messages", app.view.len()), Style::default().fg(Color::Yellow)),
        sep.clone(),
        Span::styled("Up/Down: select", hint),
    ];

    // Context actions for the selected message.
    if let Some(selected) = app.messages.selected(&app.view) {
        if selected.can_manage {
            if selected.side == Side::Sent {
                spans.push(sep.clone());
                spans.push(Span::styled("C-e: edit  C-d: delete", hint));
            }
            if selected.attachment_url.is_some() {
                spans.push(sep.clone());
                spans.push(Span::styled("C-o: image", hint));
            }
        }
    }

    spans.push(sep.clone());
    spans.push(Span::styled("C-r: reload", hint));
    spans.push(sep);
    spans.push(Span::styled("Esc: back/quit", hint));

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
