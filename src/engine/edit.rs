//! Edits and deletes of the operator's own messages.
//!
//! The sender check here is a client-side guard; the server stays the
//! authority. Results fold through the same idempotent store primitives as
//! live events, so a local delete and a live "message-deleted" for the same
//! id can land in either order.

use std::collections::HashSet;

use crate::error::SyncError;
use crate::models::{Draft, Message, MessageId, MessagePatch};

use super::composer;
use super::store::MessageStore;

#[derive(Debug, Default)]
pub struct EditDeleteController {
    deleting: HashSet<MessageId>,
}

impl EditDeleteController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `operator` may edit `id` with `draft`.
    pub fn begin_edit(
        &self,
        store: &MessageStore,
        id: &MessageId,
        operator: &str,
        draft: &Draft,
    ) -> Result<(), SyncError> {
        authorize(store, id, operator, "edit")?;
        if self.deleting.contains(id) {
            return Err(SyncError::validation(format!(
                "Message {} is being deleted",
                id
            )));
        }
        composer::validate(draft)
    }

    /// Check that `operator` may delete `id` and mark the delete outstanding.
    pub fn begin_delete(
        &mut self,
        store: &MessageStore,
        id: &MessageId,
        operator: &str,
    ) -> Result<(), SyncError> {
        authorize(store, id, operator, "delete")?;
        if !self.deleting.insert(id.clone()) {
            return Err(SyncError::validation(format!(
                "Message {} is already being deleted",
                id
            )));
        }
        Ok(())
    }

    pub fn delete_finished(&mut self, id: &MessageId) {
        self.deleting.remove(id);
    }

    pub fn reset(&mut self) {
        self.deleting.clear();
    }
}

fn authorize(
    store: &MessageStore,
    id: &MessageId,
    operator: &str,
    action: &str,
) -> Result<(), SyncError> {
    let record = store
        .get(id)
        .ok_or_else(|| SyncError::validation(format!("Cannot {} unknown message {}", action, id)))?;
    if !record.is_from(operator) {
        return Err(SyncError::validation(format!(
            "Cannot {} message {}: only its sender may",
            action, id
        )));
    }
    Ok(())
}

/// Patch that folds a confirmed edit into the record for `requested`.
pub fn edit_patch(requested: &MessageId, canonical: &Message) -> MessagePatch {
    // Ids are string-normalized at ingestion, so a mismatch here is a real one.
    if &canonical.id != requested {
        tracing::warn!(
            "Edit response for {} carries id {}; applying to the requested id",
            requested,
            canonical.id
        );
    }
    MessagePatch::from_canonical(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::tests::msg;

    fn store() -> MessageStore {
        let mut store = MessageStore::new();
        store.insert_if_absent(msg("own", "op", 0));
        store.insert_if_absent(msg("theirs", "u1", 1));
        store
    }

    #[test]
    fn test_edit_requires_sender() {
        let store = store();
        let controller = EditDeleteController::new();
        let draft = Draft::text("fixed");

        assert!(controller
            .begin_edit(&store, &"own".into(), "op", &draft)
            .is_ok());
        assert!(matches!(
            controller.begin_edit(&store, &"theirs".into(), "op", &draft),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            controller.begin_edit(&store, &"gone".into(), "op", &draft),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_edit_rejects_empty_draft() {
        let store = store();
        let controller = EditDeleteController::new();
        assert!(controller
            .begin_edit(&store, &"own".into(), "op", &Draft::text(""))
            .is_err());
    }

    #[test]
    fn test_delete_once_while_outstanding() {
        let store = store();
        let mut controller = EditDeleteController::new();
        let id = MessageId::new("own");

        assert!(controller.begin_delete(&store, &id, "op").is_ok());
        assert!(controller.begin_delete(&store, &id, "op").is_err());
        assert!(controller
            .begin_edit(&store, &id, "op", &Draft::text("x"))
            .is_err());

        controller.delete_finished(&id);
        assert!(controller.begin_delete(&store, &id, "op").is_ok());
    }

    #[test]
    fn test_edit_patch_marks_edited() {
        let mut canonical = msg("own", "op", 0);
        canonical.body = "new text".to_string();
        let patch = edit_patch(&"own".into(), &canonical);
        assert_eq!(patch.body.as_deref(), Some("new text"));
        assert_eq!(patch.edited, Some(true));
        assert_eq!(patch.attachment_url, Some(None));
    }
}
