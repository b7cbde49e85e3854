//! Compose box: text input, pending attachment, and edit mode.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::models::{Attachment, Draft, MessageId};

/// What Enter does with the input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ComposeMode {
    #[default]
    New,
    /// Replace the content of an own message.
    Editing(MessageId),
}

/// State for the compose box.
#[derive(Debug, Default)]
pub struct ComposeState {
    /// Current input text.
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
    pub attachment: Option<Attachment>,
    pub mode: ComposeMode,
}

impl ComposeState {
    /// Insert a character at the current cursor position.
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Delete the character before the cursor (backspace).
    pub fn backspace(&mut self) {
        if self.cursor_pos > 0 {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let prev_byte_pos = self.char_to_byte(self.cursor_pos - 1);
            self.input.drain(prev_byte_pos..byte_pos);
            self.cursor_pos -= 1;
        }
    }

    /// Delete the character at the cursor (delete key).
    pub fn delete(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            let byte_pos = self.char_to_byte(self.cursor_pos);
            let next_byte_pos = self.char_to_byte(self.cursor_pos + 1);
            self.input.drain(byte_pos..next_byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.input.chars().count();
    }

    /// Clear the text only (Ctrl+U).
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Back to an empty new message.
    pub fn reset(&mut self) {
        self.clear_input();
        self.attachment = None;
        self.mode = ComposeMode::New;
    }

    /// Load an own message for editing.
    pub fn begin_edit(&mut self, id: MessageId, body: &str) {
        self.input = body.to_string();
        self.move_end();
        self.attachment = None;
        self.mode = ComposeMode::Editing(id);
    }

    pub fn editing(&self) -> Option<&MessageId> {
        match self.mode {
            ComposeMode::Editing(ref id) => Some(id),
            ComposeMode::New => None,
        }
    }

    /// Current input as a draft. The box is left untouched.
    pub fn draft(&self) -> Draft {
        Draft {
            body: self.input.trim().to_string(),
            attachment: self.attachment.clone(),
        }
    }

    /// Put a failed draft back so the operator can retry.
    ///
    /// Text still in the box is not duplicated; anything else typed since is
    /// kept after the restored text.
    pub fn restore(&mut self, draft: Draft) {
        let typed = std::mem::take(&mut self.input);
        self.input = if typed.trim().is_empty() {
            draft.body
        } else if typed.trim_start().starts_with(&draft.body) {
            typed
        } else {
            format!("{} {}", draft.body, typed)
        };
        self.move_end();
        if self.attachment.is_none() {
            self.attachment = draft.attachment;
        }
        self.mode = ComposeMode::New;
    }

    /// Convert a char-based cursor position to a byte offset.
    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// 1 border + 1 info line + 1 input line + 1 border.
pub const COMPOSE_HEIGHT: u16 = 4;

/// Render the compose box and place the terminal cursor in it.
pub fn render(area: Rect, frame: &mut Frame, state: &ComposeState, conversation: &str) {
    let editing = state.editing().is_some();
    let border_style = if editing {
        Style::default().fg(Color::Magenta)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let info_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_info(info_area, frame.buffer_mut(), state);

    if inner.height >= 2 {
        let input_area = Rect::new(inner.x, inner.y + 1, inner.width, 1);
        let display = display_text(&state.input, state.cursor_pos, input_area.width as usize);

        if state.input.is_empty() {
            let placeholder = format!(" Message {}...  (/attach <file> to add an image)", conversation);
            let truncated: String = placeholder.chars().take(input_area.width as usize).collect();
            Paragraph::new(Line::from(Span::styled(
                truncated,
                Style::default().fg(Color::DarkGray),
            )))
            .render(input_area, frame.buffer_mut());
        } else {
            Paragraph::new(Line::from(Span::styled(
                format!(" {}", display.visible),
                Style::default().fg(Color::White),
            )))
            .render(input_area, frame.buffer_mut());
        }

        let cursor_x = input_area.x + 1 + display.cursor_offset as u16;
        frame.set_cursor_position((cursor_x.min(input_area.right().saturating_sub(1)), input_area.y));
    }
}

/// Mode and attachment line above the input.
fn render_info(area: Rect, buf: &mut Buffer, state: &ComposeState) {
    let mut spans = Vec::new();
    match state.mode {
        ComposeMode::Editing(ref id) => spans.push(Span::styled(
            format!(" Editing {} (Esc to cancel) ", id),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        )),
        ComposeMode::New => spans.push(Span::styled(
            " New message ",
            Style::default().fg(Color::Gray),
        )),
    }
    if let Some(ref attachment) = state.attachment {
        spans.push(Span::styled(
            format!(" [image: {} ({} bytes)] ", attachment.file_name, attachment.bytes.len()),
            Style::default().fg(Color::Cyan),
        ));
    }
    Paragraph::new(Line::from(spans)).render(area, buf);
}

/// Visible slice of the input and the cursor column within it.
struct DisplayText {
    visible: String,
    cursor_offset: usize,
}

/// Flatten newlines and scroll horizontally so the cursor stays visible.
///
/// Offsets are in terminal columns, so wide characters count double.
fn display_text(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    // One column is taken by the leading space.
    let avail = width.saturating_sub(1);
    let cells: Vec<(char, usize)> = input
        .chars()
        .map(|c| if c == '\n' { '\u{21b5}' } else { c })
        .map(|c| (c, c.width().unwrap_or(0)))
        .collect();

    let cursor_col: usize = cells.iter().take(cursor_pos).map(|(_, w)| w).sum();
    let start_col = if cursor_col < avail {
        0
    } else {
        cursor_col + 1 - avail
    };

    let mut visible = String::new();
    let mut col = 0;
    let mut used = 0;
    for (c, w) in cells {
        if col >= start_col {
            if used + w > avail {
                break;
            }
            visible.push(c);
            used += w;
        }
        col += w;
    }

    DisplayText {
        visible,
        cursor_offset: cursor_col - start_col,
    }
}
