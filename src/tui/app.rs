//! TUI application state and main event loop

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;

use crate::api::{ChatApi, RestClient};
use crate::config::Config;
use crate::engine::{Command, ConversationView, SessionEvent, SessionHandle, SessionOptions, Side};
use crate::live::{LiveFeed, SocketFeed};
use crate::models::{Attachment, ConversationId, Draft};

use super::compose::ComposeState;
use super::messages::MessagesState;
use super::ui;

/// Application state
pub struct App {
    pub should_exit: bool,
    pub operator: String,
    pub conversation: ConversationId,
    pub view: ConversationView,
    pub messages: MessagesState,
    pub compose: ComposeState,
    /// Draft of the send in flight. The input is cleared once it is confirmed.
    pub pending_send: Option<Draft>,
    /// Last notice shown in the status bar.
    pub status_message: Option<String>,
    pub status_is_error: bool,
}

impl App {
    pub fn new(operator: impl Into<String>, conversation: ConversationId) -> Self {
        Self {
            should_exit: false,
            operator: operator.into(),
            conversation,
            view: ConversationView::default(),
            messages: MessagesState::default(),
            compose: ComposeState::default(),
            pending_send: None,
            status_message: None,
            status_is_error: false,
        }
    }

    fn info(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_is_error = false;
    }

    fn error(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.status_is_error = true;
    }

    /// Fold a session update into the UI state.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::View(view) => {
                self.messages.sync(&view);
                self.view = view;
                if let Some(id) = self.compose.editing().cloned() {
                    if !self.view.messages().any(|m| m.id == id) {
                        self.compose.reset();
                        self.error(format!("Message {} was deleted while editing", id));
                    }
                }
            }
            SessionEvent::Sent { .. } => {
                // Leave the box alone if the operator moved on to something else.
                if let Some(draft) = self.pending_send.take() {
                    if self.compose.editing().is_none() && self.compose.draft() == draft {
                        self.compose.reset();
                    }
                }
                self.info("Sent");
            }
            SessionEvent::SendFailed { draft, error } => {
                self.pending_send = None;
                self.compose.restore(draft);
                self.error(format!("Not sent: {}", error));
            }
            SessionEvent::Edited(id) => {
                if self.compose.editing() == Some(&id) {
                    self.compose.reset();
                }
                self.info("Message edited");
            }
            SessionEvent::Deleted(_) => self.info("Message deleted"),
            SessionEvent::Error(e) => {
                // A rejected send surfaces as a plain error; the input still holds it.
                self.pending_send = None;
                if e.is_transient() {
                    self.error(format!("{}. Ctrl+R reloads history.", e))
                } else {
                    self.error(e.to_string())
                }
            }
        }
    }

    /// Handle a key press, returning a command for the session if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => {
                self.should_exit = true;
                None
            }
            KeyCode::Char('r') if ctrl => {
                self.info("Reloading history...");
                Some(Command::Reload)
            }
            KeyCode::Char('e') if ctrl => {
                self.edit_selected();
                None
            }
            KeyCode::Char('d') if ctrl => self.delete_selected(),
            KeyCode::Char('o') if ctrl => {
                self.show_selected_image();
                None
            }
            KeyCode::Char('u') if ctrl => {
                self.compose.clear_input();
                None
            }
            KeyCode::Esc => {
                if self.compose.editing().is_some() || self.compose.attachment.is_some() {
                    self.compose.reset();
                    self.info("Cancelled");
                } else if self.messages.selected.is_some() {
                    self.messages.selected = None;
                } else {
                    self.should_exit = true;
                }
                None
            }
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                self.compose.insert_char('\n');
                None
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Up => {
                self.messages.select_previous(&self.view);
                None
            }
            KeyCode::Down => {
                self.messages.select_next(&self.view);
                None
            }
            KeyCode::Left => {
                self.compose.move_left();
                None
            }
            KeyCode::Right => {
                self.compose.move_right();
                None
            }
            KeyCode::Home => {
                self.compose.move_home();
                None
            }
            KeyCode::End => {
                self.compose.move_end();
                None
            }
            KeyCode::Backspace => {
                self.compose.backspace();
                None
            }
            KeyCode::Delete => {
                self.compose.delete();
                None
            }
            KeyCode::Char(c) if !ctrl => {
                self.compose.insert_char(c);
                None
            }
            _ => None,
        }
    }

    /// Enter: run a slash command, or send / save the edit.
    fn submit(&mut self) -> Option<Command> {
        let input = self.compose.input.trim().to_string();
        if let Some(path) = input.strip_prefix("/attach ") {
            match Attachment::from_path(Path::new(path.trim())) {
                Ok(attachment) => {
                    self.info(format!("Attached {}", attachment.file_name));
                    self.compose.attachment = Some(attachment);
                    self.compose.clear_input();
                }
                Err(e) => self.error(format!("{:#}", e)),
            }
            return None;
        }
        if input == "/detach" {
            self.compose.attachment = None;
            self.compose.clear_input();
            self.info("Attachment removed");
            return None;
        }

        if let Some(id) = self.compose.editing().cloned() {
            // Kept in the box until the edit is confirmed.
            self.info("Saving edit...");
            return Some(Command::Edit {
                id,
                draft: self.compose.draft(),
            });
        }
        if self.pending_send.is_some() {
            self.error("Still sending the previous message");
            return None;
        }
        let draft = self.compose.draft();
        self.pending_send = Some(draft.clone());
        self.info("Sending...");
        Some(Command::Send(draft))
    }

    fn edit_selected(&mut self) {
        let Some(message) = self.messages.selected(&self.view) else {
            self.error("Select a message with Up/Down first");
            return;
        };
        if message.side != Side::Sent {
            self.error("Only your own messages can be edited");
            return;
        }
        let (id, body) = (message.id.clone(), message.body.clone());
        self.compose.begin_edit(id, &body);
    }

    fn delete_selected(&mut self) -> Option<Command> {
        let Some(message) = self.messages.selected(&self.view) else {
            self.error("Select a message with Up/Down first");
            return None;
        };
        if message.side != Side::Sent {
            self.error("Only your own messages can be deleted");
            return None;
        }
        let id = message.id.clone();
        self.info(format!("Deleting {}...", id));
        Some(Command::Delete(id))
    }

    fn show_selected_image(&mut self) {
        let url = self
            .messages
            .selected(&self.view)
            .and_then(|m| m.attachment_url.clone());
        match url {
            Some(url) => self.info(format!("Image: {}", url)),
            None => self.error("Selected message has no image"),
        }
    }
}

/// Run the TUI on `conversation` until the operator quits.
pub async fn run(config: &Config, conversation: ConversationId) -> Result<()> {
    let api: Arc<dyn ChatApi> = Arc::new(RestClient::new(config)?);
    let feed: Arc<dyn LiveFeed> = Arc::new(SocketFeed::new(config)?);
    let operator = config.operator_id()?.to_string();

    let mut session = SessionHandle::start(
        api,
        Some(feed),
        SessionOptions {
            operator: operator.clone(),
            acknowledge_reads: true,
            resync_on_reconnect: config.resync_on_reconnect,
        },
    );
    session.send(Command::Select(conversation.clone()));
    let mut app = App::new(operator, conversation);

    // ratatui::init also installs a panic hook that restores the terminal.
    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &mut app, &mut session).await;
    ratatui::restore();

    session.shutdown().await;
    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    session: &mut SessionHandle,
) -> Result<()> {
    let mut events = EventStream::new();

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(cmd) = app.handle_key(key) {
                        session.send(cmd);
                    }
                }
                // Resize and the rest are picked up by the next draw.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => break,
            },
            update = session.recv() => match update {
                Some(event) => app.apply(event),
                None => break,
            },
        }
    }

    Ok(())
}
