//! State machine for one open conversation.
//!
//! [`ConversationEngine`] owns the store and all bookkeeping. It performs no
//! I/O: operator commands and collaborator results go in, [`Effect`]s come
//! out, and the runtime carries them out. Every result is tagged with the
//! generation it was issued under; results from an earlier activation are
//! dropped.

use chrono::TimeZone;
use std::fmt::Display;

use crate::error::SyncError;
use crate::live::{FeedEvent, LiveEvent};
use crate::models::{ConversationId, Draft, Message, MessageId, MessagePatch, SessionPhase};

use super::composer::{Composer, Ticket};
use super::edit::{self, EditDeleteController};
use super::history;
use super::presenter::{self, ConversationView};
use super::receipts::ReadReceiptDriver;
use super::store::MessageStore;

/// Work for the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchHistory {
        generation: u64,
        conversation: ConversationId,
    },
    Subscribe {
        generation: u64,
        conversation: ConversationId,
    },
    Unsubscribe,
    Send {
        generation: u64,
        ticket: Ticket,
        conversation: ConversationId,
        sender: String,
        draft: Draft,
    },
    Edit {
        generation: u64,
        id: MessageId,
        sender: String,
        draft: Draft,
    },
    Delete {
        generation: u64,
        id: MessageId,
    },
    AcknowledgeRead {
        generation: u64,
        id: MessageId,
    },
    Notify(Notice),
}

/// Something the operator should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Store contents or phase changed; re-render.
    Changed,
    Sent { ticket: Ticket, id: MessageId },
    /// The draft is handed back so the input can be restored.
    SendFailed { draft: Draft, error: SyncError },
    Edited(MessageId),
    Deleted(MessageId),
    Error(SyncError),
}

/// Result of a collaborator call or a live delivery.
#[derive(Debug)]
pub enum Input {
    HistoryLoaded {
        generation: u64,
        result: Result<Vec<Message>, SyncError>,
    },
    Feed {
        generation: u64,
        event: FeedEvent,
    },
    Sent {
        generation: u64,
        ticket: Ticket,
        result: Result<Message, SyncError>,
    },
    Edited {
        generation: u64,
        id: MessageId,
        result: Result<Message, SyncError>,
    },
    Deleted {
        generation: u64,
        id: MessageId,
        result: Result<(), SyncError>,
    },
    ReadAcknowledged {
        generation: u64,
        id: MessageId,
        result: Result<Option<Message>, SyncError>,
    },
}

impl Input {
    fn generation(&self) -> u64 {
        match self {
            Input::HistoryLoaded { generation, .. }
            | Input::Feed { generation, .. }
            | Input::Sent { generation, .. }
            | Input::Edited { generation, .. }
            | Input::Deleted { generation, .. }
            | Input::ReadAcknowledged { generation, .. } => *generation,
        }
    }
}

pub struct ConversationEngine {
    operator: String,
    acknowledge_reads: bool,
    resync_on_reconnect: bool,
    phase: SessionPhase,
    conversation: Option<ConversationId>,
    generation: u64,
    store: MessageStore,
    receipts: ReadReceiptDriver,
    composer: Composer,
    edits: EditDeleteController,
}

impl ConversationEngine {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            acknowledge_reads: true,
            resync_on_reconnect: false,
            phase: SessionPhase::Idle,
            conversation: None,
            generation: 0,
            store: MessageStore::new(),
            receipts: ReadReceiptDriver::new(),
            composer: Composer::new(),
            edits: EditDeleteController::new(),
        }
    }

    /// Whether inbound messages get read receipts. One-shot CLI commands turn this off.
    pub fn acknowledge_reads(mut self, enabled: bool) -> Self {
        self.acknowledge_reads = enabled;
        self
    }

    /// Re-fetch history when the live stream reconnects.
    pub fn resync_on_reconnect(mut self, enabled: bool) -> Self {
        self.resync_on_reconnect = enabled;
        self
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Open `conversation`, closing whatever was open before.
    pub fn activate(&mut self, conversation: ConversationId) -> Vec<Effect> {
        // Release the old subscription before the new one is acquired.
        let mut effects = self.close();
        self.generation += 1;
        self.phase = SessionPhase::Loading;
        self.conversation = Some(conversation.clone());
        tracing::info!(
            "Opening conversation {} (generation {})",
            conversation,
            self.generation
        );

        effects.push(Effect::FetchHistory {
            generation: self.generation,
            conversation: conversation.clone(),
        });
        effects.push(Effect::Subscribe {
            generation: self.generation,
            conversation,
        });
        effects.push(Effect::Notify(Notice::Changed));
        effects
    }

    /// Close the open conversation: unsubscribe, clear the store, drop pending work.
    pub fn close(&mut self) -> Vec<Effect> {
        let Some(conversation) = self.conversation.take() else {
            return Vec::new();
        };
        self.phase = SessionPhase::Closing;
        tracing::info!("Closing conversation {}", conversation);

        self.store.clear();
        self.receipts.reset();
        self.composer.reset();
        self.edits.reset();
        // Anything still in flight now belongs to a dead generation.
        self.generation += 1;
        self.phase = SessionPhase::Idle;

        vec![Effect::Unsubscribe, Effect::Notify(Notice::Changed)]
    }

    /// Fetch history again for the open conversation.
    pub fn reload(&mut self) -> Result<Vec<Effect>, SyncError> {
        let conversation = self.conversation.clone().ok_or(SyncError::Inactive)?;
        Ok(vec![Effect::FetchHistory {
            generation: self.generation,
            conversation,
        }])
    }

    pub fn send(&mut self, draft: Draft) -> Result<Vec<Effect>, SyncError> {
        let conversation = self.conversation.clone().ok_or(SyncError::Inactive)?;
        let (ticket, draft) = self.composer.prepare(draft)?;
        tracing::debug!(
            "Sending ticket {} to {} ({} outstanding)",
            ticket,
            conversation,
            self.composer.pending()
        );
        Ok(vec![Effect::Send {
            generation: self.generation,
            ticket,
            conversation,
            sender: self.operator.clone(),
            draft,
        }])
    }

    pub fn edit(&mut self, id: MessageId, draft: Draft) -> Result<Vec<Effect>, SyncError> {
        if self.conversation.is_none() {
            return Err(SyncError::Inactive);
        }
        self.edits
            .begin_edit(&self.store, &id, &self.operator, &draft)?;
        Ok(vec![Effect::Edit {
            generation: self.generation,
            id,
            sender: self.operator.clone(),
            draft,
        }])
    }

    pub fn delete(&mut self, id: MessageId) -> Result<Vec<Effect>, SyncError> {
        if self.conversation.is_none() {
            return Err(SyncError::Inactive);
        }
        self.edits.begin_delete(&self.store, &id, &self.operator)?;
        Ok(vec![Effect::Delete {
            generation: self.generation,
            id,
        }])
    }

    /// Apply one collaborator result or live delivery.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if input.generation() != self.generation || self.conversation.is_none() {
            tracing::debug!(
                "Dropping result from generation {} (current {})",
                input.generation(),
                self.generation
            );
            return Vec::new();
        }

        let mut effects = Vec::new();
        let mut mutated = false;

        match input {
            Input::HistoryLoaded { result, .. } => {
                match result {
                    Ok(records) => {
                        if let Some(ref conversation) = self.conversation {
                            let inserted = history::seed(&mut self.store, records, conversation);
                            tracing::info!("History seeded {} new message(s)", inserted);
                            mutated = inserted > 0;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("History fetch failed: {}", e);
                        effects.push(Effect::Notify(Notice::Error(e)));
                    }
                }
                if self.phase == SessionPhase::Loading {
                    self.phase = SessionPhase::Live;
                    effects.push(Effect::Notify(Notice::Changed));
                }
            }
            Input::Feed { event, .. } => match event {
                FeedEvent::Event(event) => mutated = self.apply_live(event),
                FeedEvent::Reconnected => {
                    tracing::info!("Live stream reconnected; events while down may be missing");
                    if self.resync_on_reconnect {
                        if let Some(ref conversation) = self.conversation {
                            effects.push(Effect::FetchHistory {
                                generation: self.generation,
                                conversation: conversation.clone(),
                            });
                        }
                    }
                }
            },
            Input::Sent { ticket, result, .. } => match result {
                Ok(record) => {
                    self.composer.confirmed(ticket);
                    let id = record.id.clone();
                    mutated = self.store.insert_if_absent(record).changed();
                    effects.push(Effect::Notify(Notice::Sent { ticket, id }));
                }
                Err(error) => {
                    tracing::warn!("Send failed: {}", error);
                    if let Some(draft) = self.composer.failed(ticket) {
                        effects.push(Effect::Notify(Notice::SendFailed { draft, error }));
                    } else {
                        effects.push(Effect::Notify(Notice::Error(error)));
                    }
                }
            },
            Input::Edited { id, result, .. } => match result {
                Ok(record) => {
                    let patch = edit::edit_patch(&id, &record);
                    let merge = self.store.update_by_id(&id, patch);
                    mutated = merge.changed();
                    if self.store.contains(&id) {
                        effects.push(Effect::Notify(Notice::Edited(id)));
                    } else {
                        tracing::debug!("Edit of {} confirmed after removal ({:?})", id, merge);
                    }
                }
                Err(e) => {
                    tracing::warn!("Edit of {} failed: {}", id, e);
                    effects.push(Effect::Notify(Notice::Error(e)));
                }
            },
            Input::Deleted { id, result, .. } => {
                self.edits.delete_finished(&id);
                match result {
                    Ok(()) => {
                        mutated = self.store.remove_by_id(&id).changed();
                        effects.push(Effect::Notify(Notice::Deleted(id)));
                    }
                    Err(e) => {
                        tracing::warn!("Delete of {} failed: {}", id, e);
                        effects.push(Effect::Notify(Notice::Error(e)));
                    }
                }
            }
            Input::ReadAcknowledged { id, result, .. } => match result {
                Ok(_) => {
                    // A returned record only confirms the flag; the patch is the same either way.
                    self.receipts.acknowledged(&id);
                    mutated = self.store.update_by_id(&id, MessagePatch::read()).changed();
                }
                Err(e) => {
                    tracing::warn!("Read acknowledgement for {} failed: {}", id, e);
                    self.receipts.failed(&id);
                    effects.push(Effect::Notify(Notice::Error(e)));
                }
            },
        }

        if mutated {
            self.after_mutation(&mut effects);
        }
        effects
    }

    fn apply_live(&mut self, event: LiveEvent) -> bool {
        let Some(ref active) = self.conversation else {
            return false;
        };
        if !event.is_for(active) {
            tracing::debug!(
                "Discarding {} for another conversation ({:?})",
                event.kind(),
                event.conversation()
            );
            return false;
        }

        let outcome = match event {
            LiveEvent::NewMessage(record) => self.store.insert_if_absent(record),
            LiveEvent::Edited {
                id,
                body,
                attachment_url,
                ..
            } => self
                .store
                .update_by_id(&id, MessagePatch::edit(body, attachment_url)),
            LiveEvent::Read { id, .. } => self.store.update_by_id(&id, MessagePatch::read()),
            LiveEvent::Deleted { id, .. } => self.store.remove_by_id(&id),
        };
        if !outcome.changed() {
            tracing::debug!("Live event was a no-op ({:?})", outcome);
        }
        outcome.changed()
    }

    fn after_mutation(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::Notify(Notice::Changed));
        if !self.acknowledge_reads {
            return;
        }
        for id in self.receipts.scan(&self.store, &self.operator) {
            effects.push(Effect::AcknowledgeRead {
                generation: self.generation,
                id,
            });
        }
    }

    /// Current view in the display time zone.
    pub fn view<Tz>(&self, tz: &Tz) -> ConversationView
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        ConversationView {
            conversation: self.conversation.clone(),
            phase: self.phase,
            days: presenter::present(&self.store.snapshot(), &self.operator, tz),
            appended: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::tests::msg;
    use chrono::Utc;

    fn open(engine: &mut ConversationEngine, conversation: &str) -> u64 {
        engine.activate(ConversationId::new(conversation));
        engine.generation()
    }

    fn acks(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::AcknowledgeRead { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    fn live(generation: u64, event: LiveEvent) -> Input {
        Input::Feed {
            generation,
            event: FeedEvent::Event(event),
        }
    }

    #[test]
    fn test_activate_and_switch_effects() {
        let mut engine = ConversationEngine::new("op");
        let effects = engine.activate("c1".into());
        let gen = engine.generation();
        assert_eq!(engine.phase(), SessionPhase::Loading);
        assert_eq!(
            effects[..2],
            [
                Effect::FetchHistory {
                    generation: gen,
                    conversation: "c1".into()
                },
                Effect::Subscribe {
                    generation: gen,
                    conversation: "c1".into()
                },
            ]
        );

        let effects = engine.activate("c2".into());
        assert_eq!(effects[0], Effect::Unsubscribe);
        let subscribe = effects
            .iter()
            .position(|e| matches!(e, Effect::Subscribe { .. }))
            .unwrap();
        assert!(subscribe > 0);
        assert!(engine.generation() > gen);
    }

    #[test]
    fn test_history_failure_still_goes_live() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        let effects = engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Err(SyncError::Network {
                operation: crate::error::Operation::History,
                message: "HTTP 502".to_string(),
            }),
        });
        assert_eq!(engine.phase(), SessionPhase::Live);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Notify(Notice::Error(_)))));

        // Retry on the same conversation.
        assert_eq!(
            engine.reload().unwrap(),
            vec![Effect::FetchHistory {
                generation: gen,
                conversation: "c1".into()
            }]
        );
    }

    #[test]
    fn test_duplicate_delivery_keeps_one_record() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m1", "u1", 0)]),
        });
        let effects = engine.handle(live(gen, LiveEvent::NewMessage(msg("m1", "u1", 0))));

        assert_eq!(engine.store().len(), 1);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_live_before_history_is_absorbed() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(live(gen, LiveEvent::NewMessage(msg("m3", "u1", 2))));
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m1", "u1", 0), msg("m2", "op", 1)]),
        });

        let view = engine.view(&Utc);
        let ids: Vec<&str> = view.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(view.phase, SessionPhase::Live);
    }

    #[test]
    fn test_read_receipt_convergence() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        let effects = engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m2", "u1", 0), msg("own", "op", 1)]),
        });
        assert_eq!(acks(&effects), vec!["m2"]);

        // Another mutation while the ack is in flight does not reissue it.
        let effects = engine.handle(live(gen, LiveEvent::NewMessage(msg("m4", "u1", 2))));
        assert_eq!(acks(&effects), vec!["m4"]);

        let id = MessageId::new("m2");
        engine.handle(Input::ReadAcknowledged {
            generation: gen,
            id: id.clone(),
            result: Ok(None),
        });
        assert!(engine.store().get(&id).unwrap().read);

        let effects = engine.handle(live(
            gen,
            LiveEvent::Read {
                id: id.clone(),
                conversation: None,
            },
        ));
        assert!(effects.is_empty());
        assert!(engine.store().get(&id).unwrap().read);
        assert_eq!(engine.store().len(), 3);
    }

    #[test]
    fn test_read_event_before_ack_response() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m2", "u1", 0)]),
        });
        let id = MessageId::new("m2");

        engine.handle(live(
            gen,
            LiveEvent::Read {
                id: id.clone(),
                conversation: Some("c1".into()),
            },
        ));
        let mut echoed = msg("m2", "u1", 0);
        echoed.read = true;
        let effects = engine.handle(Input::ReadAcknowledged {
            generation: gen,
            id: id.clone(),
            result: Ok(Some(echoed)),
        });
        assert!(effects.is_empty());
        assert!(engine.store().get(&id).unwrap().read);
    }

    #[test]
    fn test_receipts_can_be_disabled() {
        let mut engine = ConversationEngine::new("op").acknowledge_reads(false);
        let gen = open(&mut engine, "c1");
        let effects = engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m2", "u1", 0)]),
        });
        assert!(acks(&effects).is_empty());
    }

    #[test]
    fn test_stale_edit_after_delete() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m3", "u1", 0)]),
        });
        engine.handle(live(
            gen,
            LiveEvent::Deleted {
                id: "m3".into(),
                conversation: None,
            },
        ));
        let effects = engine.handle(live(
            gen,
            LiveEvent::Edited {
                id: "m3".into(),
                conversation: None,
                body: Some("late".to_string()),
                attachment_url: None,
            },
        ));

        assert!(effects.is_empty());
        assert!(!engine.store().contains(&"m3".into()));
    }

    #[test]
    fn test_edit_confirmed_after_delete_is_silent() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("own", "op", 0)]),
        });
        engine.edit("own".into(), Draft::text("fixed")).unwrap();
        engine.handle(live(
            gen,
            LiveEvent::Deleted {
                id: "own".into(),
                conversation: None,
            },
        ));

        let mut canonical = msg("own", "op", 0);
        canonical.body = "fixed".to_string();
        let effects = engine.handle(Input::Edited {
            generation: gen,
            id: "own".into(),
            result: Ok(canonical),
        });
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::Notify(Notice::Edited(_)))));
        assert!(!engine.store().contains(&"own".into()));
    }

    #[test]
    fn test_results_from_previous_conversation_are_dropped() {
        let mut engine = ConversationEngine::new("op");
        let old = open(&mut engine, "c1");
        let new = open(&mut engine, "c2");
        assert_ne!(old, new);

        let effects = engine.handle(Input::HistoryLoaded {
            generation: old,
            result: Ok(vec![msg("m1", "u1", 0)]),
        });
        assert!(effects.is_empty());
        engine.handle(live(old, LiveEvent::NewMessage(msg("m2", "u1", 1))));
        assert!(engine.store().is_empty());
        assert_eq!(engine.phase(), SessionPhase::Loading);
    }

    #[test]
    fn test_events_scoped_to_other_conversation_are_discarded() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        let mut foreign = msg("x1", "u2", 0);
        foreign.conversation_id = Some("c2".into());
        let mut scoped = msg("m1", "u1", 0);
        scoped.conversation_id = Some("c1".into());

        engine.handle(live(gen, LiveEvent::NewMessage(foreign)));
        engine.handle(live(gen, LiveEvent::NewMessage(scoped)));
        engine.handle(live(gen, LiveEvent::NewMessage(msg("m2", "u1", 1))));

        assert_eq!(engine.store().len(), 2);
        assert!(!engine.store().contains(&"x1".into()));
    }

    #[test]
    fn test_close_clears_everything() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("m1", "u1", 0)]),
        });

        let effects = engine.close();
        assert_eq!(effects[0], Effect::Unsubscribe);
        assert!(engine.store().is_empty());
        assert_eq!(engine.phase(), SessionPhase::Idle);
        assert!(engine.conversation().is_none());
        assert!(engine.close().is_empty());
        assert_eq!(engine.send(Draft::text("hi")), Err(SyncError::Inactive));
    }

    #[test]
    fn test_send_validation_makes_no_request() {
        let mut engine = ConversationEngine::new("op");
        open(&mut engine, "c1");
        let err = engine.send(Draft::text("   ")).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn test_send_confirmation_after_live_echo() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        let effects = engine.send(Draft::text("hello")).unwrap();
        let Effect::Send { ticket, sender, .. } = &effects[0] else {
            panic!("expected send effect, got {:?}", effects);
        };
        assert_eq!(sender, "op");
        let ticket = *ticket;

        // Nothing is echoed before confirmation.
        assert!(engine.store().is_empty());

        engine.handle(live(gen, LiveEvent::NewMessage(msg("s1", "op", 0))));
        let effects = engine.handle(Input::Sent {
            generation: gen,
            ticket,
            result: Ok(msg("s1", "op", 0)),
        });
        assert_eq!(engine.store().len(), 1);
        assert!(effects.contains(&Effect::Notify(Notice::Sent {
            ticket,
            id: "s1".into()
        })));
    }

    #[test]
    fn test_send_failure_returns_draft() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        let effects = engine.send(Draft::text("keep me")).unwrap();
        let Effect::Send { ticket, .. } = effects[0] else {
            panic!("expected send effect");
        };

        let error = SyncError::Network {
            operation: crate::error::Operation::Send,
            message: "timeout".to_string(),
        };
        let effects = engine.handle(Input::Sent {
            generation: gen,
            ticket,
            result: Err(error.clone()),
        });
        assert_eq!(
            effects,
            vec![Effect::Notify(Notice::SendFailed {
                draft: Draft::text("keep me"),
                error,
            })]
        );
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_edit_own_message() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        engine.handle(Input::HistoryLoaded {
            generation: gen,
            result: Ok(vec![msg("own", "op", 0), msg("theirs", "u1", 1)]),
        });

        assert!(matches!(
            engine.edit("theirs".into(), Draft::text("nope")),
            Err(SyncError::Validation(_))
        ));

        let effects = engine.edit("own".into(), Draft::text("fixed")).unwrap();
        assert!(matches!(effects[0], Effect::Edit { .. }));

        let mut canonical = msg("own", "op", 0);
        canonical.body = "fixed".to_string();
        engine.handle(Input::Edited {
            generation: gen,
            id: "own".into(),
            result: Ok(canonical),
        });
        let record = engine.store().get(&"own".into()).unwrap();
        assert_eq!(record.body, "fixed");
        assert!(record.edited);

        // The live echo of the same edit changes nothing further.
        let effects = engine.handle(live(
            gen,
            LiveEvent::Edited {
                id: "own".into(),
                conversation: None,
                body: Some("fixed".to_string()),
                attachment_url: Some(None),
            },
        ));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_local_delete_and_live_delete_in_either_order() {
        for live_first in [true, false] {
            let mut engine = ConversationEngine::new("op");
            let gen = open(&mut engine, "c1");
            engine.handle(Input::HistoryLoaded {
                generation: gen,
                result: Ok(vec![msg("own", "op", 0)]),
            });
            engine.delete("own".into()).unwrap();

            let live_delete = live(
                gen,
                LiveEvent::Deleted {
                    id: "own".into(),
                    conversation: None,
                },
            );
            let confirmed = Input::Deleted {
                generation: gen,
                id: "own".into(),
                result: Ok(()),
            };
            if live_first {
                engine.handle(live_delete);
                let effects = engine.handle(confirmed);
                assert!(effects.contains(&Effect::Notify(Notice::Deleted("own".into()))));
            } else {
                engine.handle(confirmed);
                assert!(engine.handle(live_delete).is_empty());
            }
            assert!(engine.store().is_empty());
        }
    }

    #[test]
    fn test_resync_on_reconnect() {
        let mut engine = ConversationEngine::new("op");
        let gen = open(&mut engine, "c1");
        let reconnected = || Input::Feed {
            generation: gen,
            event: FeedEvent::Reconnected,
        };
        assert!(engine.handle(reconnected()).is_empty());

        let mut engine = ConversationEngine::new("op").resync_on_reconnect(true);
        let gen = open(&mut engine, "c1");
        let effects = engine.handle(Input::Feed {
            generation: gen,
            event: FeedEvent::Reconnected,
        });
        assert_eq!(
            effects,
            vec![Effect::FetchHistory {
                generation: gen,
                conversation: "c1".into()
            }]
        );
    }
}
