//! Messages pane: day separators and left/right aligned bubbles.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::engine::{ConversationView, MessageView, Side};
use crate::models::MessageId;

/// Bubbles take at most this share of the pane width, in percent.
const BUBBLE_WIDTH_PCT: usize = 70;

/// Selection within the messages pane.
///
/// With nothing selected the pane follows the newest message.
#[derive(Debug, Default)]
pub struct MessagesState {
    pub selected: Option<MessageId>,
}

impl MessagesState {
    fn position(&self, view: &ConversationView) -> Option<usize> {
        let id = self.selected.as_ref()?;
        view.messages().position(|m| &m.id == id)
    }

    pub fn selected<'a>(&self, view: &'a ConversationView) -> Option<&'a MessageView> {
        let id = self.selected.as_ref()?;
        view.messages().find(|m| &m.id == id)
    }

    /// Move selection towards older messages, starting from the newest.
    pub fn select_previous(&mut self, view: &ConversationView) {
        let next = match self.position(view) {
            Some(0) => 0,
            Some(pos) => pos - 1,
            None => match view.len() {
                0 => return,
                len => len - 1,
            },
        };
        self.selected = view.messages().nth(next).map(|m| m.id.clone());
    }

    /// Move selection towards newer messages; past the newest, follow the tail again.
    pub fn select_next(&mut self, view: &ConversationView) {
        self.selected = self
            .position(view)
            .and_then(|pos| view.messages().nth(pos + 1))
            .map(|m| m.id.clone());
    }

    /// Drop a selection that no longer exists, and jump to the tail on appends.
    pub fn sync(&mut self, view: &ConversationView) {
        if view.appended || self.position(view).is_none() {
            self.selected = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the messages pane into the given area.
pub fn render(area: Rect, buf: &mut Buffer, view: &ConversationView, state: &MessagesState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    if view.is_empty() {
        let text = match view.phase {
            crate::models::SessionPhase::Loading => " Loading history...",
            _ => " No messages yet.",
        };
        Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(Color::DarkGray),
        )))
        .render(inner, buf);
        return;
    }

    let (lines, ranges) = build_lines(view, state.selected.as_ref(), inner.width as usize);
    let visible_height = inner.height as usize;
    let selected_range = state.position(view).and_then(|pos| ranges.get(pos).copied());
    let scroll = compute_scroll(selected_range, visible_height, lines.len());

    for (row, line) in lines.iter().skip(scroll).take(visible_height).enumerate() {
        let line_area = Rect::new(inner.x, inner.y + row as u16, inner.width, 1);
        Paragraph::new(line.clone()).render(line_area, buf);
    }

    if lines.len() > visible_height {
        let x = inner.right().saturating_sub(1);
        if scroll > 0 {
            let cell = &mut buf[(x, inner.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if scroll + visible_height < lines.len() {
            let cell = &mut buf[(x, inner.bottom().saturating_sub(1))];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }
}

/// First visible line: the tail when nothing is selected, otherwise just
/// enough to keep the selected bubble on screen.
fn compute_scroll(selected: Option<(usize, usize)>, visible: usize, total: usize) -> usize {
    let bottom = total.saturating_sub(visible);
    match selected {
        None => bottom,
        Some((start, end)) => {
            if end <= visible {
                0
            } else if end - start > visible {
                start.min(bottom)
            } else {
                (end - visible).min(bottom)
            }
        }
    }
}

/// Flatten the view into styled lines, with the line range of each message.
fn build_lines(
    view: &ConversationView,
    selected: Option<&MessageId>,
    width: usize,
) -> (Vec<Line<'static>>, Vec<(usize, usize)>) {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut ranges = Vec::new();

    for day in &view.days {
        lines.push(day_separator(&day.label(), width));
        for message in &day.messages {
            let start = lines.len();
            let is_selected = selected == Some(&message.id);
            push_bubble(&mut lines, message, width, is_selected);
            lines.push(Line::from(""));
            ranges.push((start, lines.len()));
        }
    }

    (lines, ranges)
}

fn day_separator(label: &str, width: usize) -> Line<'static> {
    let text = format!(" {} ", label);
    let fill = width.saturating_sub(text.width());
    let left = fill / 2;
    let right = fill - left;
    Line::from(vec![
        Span::styled("\u{2500}".repeat(left), Style::default().fg(Color::DarkGray)),
        Span::styled(text, Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
        Span::styled("\u{2500}".repeat(right), Style::default().fg(Color::DarkGray)),
    ])
}

/// One message: header, wrapped body, optional image line. Own messages
/// are right-aligned.
fn push_bubble(lines: &mut Vec<Line<'static>>, message: &MessageView, width: usize, is_selected: bool) {
    let max_width = (width * BUBBLE_WIDTH_PCT / 100).max(10).min(width);

    let mut header = format!("{} {}", message.time, message.sender);
    if message.edited {
        header.push_str(" (edited)");
    }
    if message.side == Side::Sent {
        header.push_str(if message.read { " \u{2713}\u{2713}" } else { " \u{2713}" });
    }

    let mut body = if message.body.trim().is_empty() {
        Vec::new()
    } else {
        wrap_text(&message.body, max_width.saturating_sub(2))
    };
    if let Some(ref url) = message.attachment_url {
        body.push(format!("[image] {}", truncate_to_width(url, max_width.saturating_sub(10))));
    }

    let content_width = body
        .iter()
        .map(|l| l.width())
        .chain(std::iter::once(header.width()))
        .max()
        .unwrap_or(0);

    let (accent, text_style) = match message.side {
        Side::Sent => (Color::Cyan, Style::default().fg(Color::White)),
        Side::Received => (Color::Green, Style::default().fg(Color::Gray)),
    };
    let marker_style = if is_selected {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(accent)
    };
    let marker = if is_selected { "\u{2503} " } else { "\u{2502} " };

    let indent = match message.side {
        Side::Sent => " ".repeat(width.saturating_sub(content_width + 2)),
        Side::Received => String::new(),
    };

    let header_style = Style::default().fg(accent).add_modifier(Modifier::BOLD);
    lines.push(Line::from(vec![
        Span::raw(indent.clone()),
        Span::styled(marker, marker_style),
        Span::styled(header, header_style),
    ]));
    for text in body {
        lines.push(Line::from(vec![
            Span::raw(indent.clone()),
            Span::styled(marker, marker_style),
            Span::styled(text, text_style),
        ]));
    }
}

/// Greedy word wrap by display width. Words longer than `width` are split.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if line.is_empty() {
                word.width()
            } else {
                line.width() + 1 + word.width()
            };
            if needed <= width {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(word);
                continue;
            }
            if !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            for c in word.chars() {
                let w = c.width().unwrap_or(0);
                if line.width() + w > width {
                    out.push(std::mem::take(&mut line));
                }
                line.push(c);
            }
        }
        out.push(line);
    }

    while out.len() > 1 && out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        if out.width() + c.width().unwrap_or(0) + 3 > width {
            break;
        }
        out.push(c);
    }
    out.push_str("...");
    out
}
