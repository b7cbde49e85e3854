//! Async driver for a [`ConversationEngine`].
//!
//! Callers talk to the session through an mpsc channel pair: [`Command`]s go
//! in, [`SessionEvent`]s come out. A background task owns the engine and
//! spawns one task per collaborator call, so slow requests never block the
//! loop. Results come back tagged with the generation they were issued under.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::ChatApi;
use crate::error::{Operation, SyncError};
use crate::live::{FeedEvent, LiveFeed};
use crate::models::{ConversationId, Draft, MessageId};

use super::composer::Ticket;
use super::history;
use super::presenter::{self, ConversationView};
use super::session::{ConversationEngine, Effect, Input, Notice};

/// Operator intents.
#[derive(Debug)]
pub enum Command {
    /// Open a conversation, closing the current one.
    Select(ConversationId),
    /// Fetch history again.
    Reload,
    Send(Draft),
    Edit { id: MessageId, draft: Draft },
    Delete(MessageId),
    Close,
}

/// Updates for the UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    View(ConversationView),
    Sent { ticket: Ticket, id: MessageId },
    /// Restore `draft` into the input.
    SendFailed { draft: Draft, error: SyncError },
    Edited(MessageId),
    Deleted(MessageId),
    Error(SyncError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub operator: String,
    pub acknowledge_reads: bool,
    pub resync_on_reconnect: bool,
}

/// Handle for driving a running session.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn the session loop. Without a feed the session only sees REST results.
    pub fn start(
        api: Arc<dyn ChatApi>,
        feed: Option<Arc<dyn LiveFeed>>,
        options: SessionOptions,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let engine = ConversationEngine::new(options.operator)
            .acknowledge_reads(options.acknowledge_reads)
            .resync_on_reconnect(options.resync_on_reconnect);
        let task = tokio::spawn(session_loop(engine, api, feed, cmd_rx, event_tx));

        Self {
            cmd_tx,
            event_rx,
            task,
        }
    }

    /// Queue a command (non-blocking).
    pub fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Session channel closed -- command dropped");
        }
    }

    /// Next update. `None` once the session loop has exited.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Close the open conversation and wait for the loop to finish.
    pub async fn shutdown(self) {
        let Self { cmd_tx, task, .. } = self;
        drop(cmd_tx);
        if let Err(e) = task.await {
            tracing::warn!("Session task ended abnormally: {}", e);
        }
    }
}

/// Live subscription of one generation. Dropping it stops forwarding; the
/// feed sees its sink close and leaves the room on its own.
struct Subscription {
    forward: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forward.abort();
    }
}

struct Runtime {
    engine: ConversationEngine,
    api: Arc<dyn ChatApi>,
    feed: Option<Arc<dyn LiveFeed>>,
    input_tx: mpsc::UnboundedSender<Input>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    subscription: Option<Subscription>,
    last_tail: Option<(MessageId, DateTime<Utc>)>,
}

async fn session_loop(
    engine: ConversationEngine,
    api: Arc<dyn ChatApi>,
    feed: Option<Arc<dyn LiveFeed>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    let mut rt = Runtime {
        engine,
        api,
        feed,
        input_tx,
        event_tx,
        subscription: None,
        last_tail: None,
    };

    loop {
        let effects = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => rt.command(cmd),
                None => {
                    let effects = rt.engine.close();
                    rt.execute(effects);
                    break;
                }
            },
            Some(input) = input_rx.recv() => rt.engine.handle(input),
        };
        rt.execute(effects);
    }
    tracing::debug!("Session loop exited");
}

impl Runtime {
    fn command(&mut self, cmd: Command) -> Vec<Effect> {
        let result = match cmd {
            Command::Select(conversation) => Ok(self.engine.activate(conversation)),
            Command::Reload => self.engine.reload(),
            Command::Send(draft) => self.engine.send(draft),
            Command::Edit { id, draft } => self.engine.edit(id, draft),
            Command::Delete(id) => self.engine.delete(id),
            Command::Close => Ok(self.engine.close()),
        };
        result.unwrap_or_else(|e| vec![Effect::Notify(Notice::Error(e))])
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        let mut changed = false;
        for effect in effects {
            match effect {
                Effect::FetchHistory {
                    generation,
                    conversation,
                } => {
                    let api = Arc::clone(&self.api);
                    self.spawn(async move {
                        let result = history::load_history(api.as_ref(), &conversation).await;
                        Input::HistoryLoaded { generation, result }
                    });
                }
                Effect::Subscribe {
                    generation,
                    conversation,
                } => self.subscribe(generation, conversation),
                Effect::Unsubscribe => self.subscription = None,
                Effect::Send {
                    generation,
                    ticket,
                    conversation,
                    sender,
                    draft,
                } => {
                    let api = Arc::clone(&self.api);
                    self.spawn(async move {
                        let result = api
                            .send_message(&conversation, &sender, &draft)
                            .await
                            .map_err(|e| SyncError::from_api(Operation::Send, e));
                        Input::Sent {
                            generation,
                            ticket,
                            result,
                        }
                    });
                }
                Effect::Edit {
                    generation,
                    id,
                    sender,
                    draft,
                } => {
                    let api = Arc::clone(&self.api);
                    self.spawn(async move {
                        let result = api
                            .edit_message(&id, &sender, &draft)
                            .await
                            .map_err(|e| SyncError::from_api(Operation::Edit, e));
                        Input::Edited {
                            generation,
                            id,
                            result,
                        }
                    });
                }
                Effect::Delete { generation, id } => {
                    let api = Arc::clone(&self.api);
                    self.spawn(async move {
                        let result = api
                            .delete_message(&id)
                            .await
                            .map_err(|e| SyncError::from_api(Operation::Delete, e));
                        Input::Deleted {
                            generation,
                            id,
                            result,
                        }
                    });
                }
                Effect::AcknowledgeRead { generation, id } => {
                    let api = Arc::clone(&self.api);
                    self.spawn(async move {
                        let result = api
                            .acknowledge_read(&id)
                            .await
                            .map_err(|e| SyncError::from_api(Operation::AcknowledgeRead, e));
                        Input::ReadAcknowledged {
                            generation,
                            id,
                            result,
                        }
                    });
                }
                Effect::Notify(Notice::Changed) => changed = true,
                Effect::Notify(notice) => self.notify(notice),
            }
        }
        if changed {
            self.publish_view();
        }
    }

    /// Run `call` on its own task and feed the result back into the loop.
    fn spawn<F>(&self, call: F)
    where
        F: std::future::Future<Output = Input> + Send + 'static,
    {
        let input_tx = self.input_tx.clone();
        tokio::spawn(async move {
            let _ = input_tx.send(call.await);
        });
    }

    fn subscribe(&mut self, generation: u64, conversation: ConversationId) {
        // Release any previous subscription first.
        self.subscription = None;
        let Some(ref feed) = self.feed else {
            tracing::debug!("No live feed configured; {} is REST only", conversation);
            return;
        };

        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<FeedEvent>();
        let feed = Arc::clone(feed);
        tokio::spawn(async move {
            if let Err(e) = feed.run(conversation.clone(), feed_tx).await {
                tracing::error!("Live feed for {} stopped: {:#}", conversation, e);
            }
        });

        let input_tx = self.input_tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if input_tx.send(Input::Feed { generation, event }).is_err() {
                    break;
                }
            }
        });
        self.subscription = Some(Subscription { forward });
    }

    fn notify(&self, notice: Notice) {
        let event = match notice {
            Notice::Changed => return,
            Notice::Sent { ticket, id } => SessionEvent::Sent { ticket, id },
            Notice::SendFailed { draft, error } => SessionEvent::SendFailed { draft, error },
            Notice::Edited(id) => SessionEvent::Edited(id),
            Notice::Deleted(id) => SessionEvent::Deleted(id),
            Notice::Error(e) => SessionEvent::Error(e),
        };
        let _ = self.event_tx.send(event);
    }

    fn publish_view(&mut self) {
        let mut view = self.engine.view(&Local);
        view.appended = presenter::appended(self.last_tail.as_ref(), &view.days);
        self.last_tail = view.tail().map(|m| (m.id.clone(), m.created_at));
        let _ = self.event_tx.send(SessionEvent::View(view));
    }
}
