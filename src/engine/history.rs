//! History fetch that seeds the store when a conversation opens.

use crate::api::ChatApi;
use crate::error::{Operation, SyncError};
use crate::models::{ConversationId, Message};

use super::store::MessageStore;

/// Fetch the full history of `conversation`.
///
/// Records are already normalized by the API layer. Safe to call again on
/// the same conversation to retry.
pub async fn load_history(
    api: &dyn ChatApi,
    conversation: &ConversationId,
) -> Result<Vec<Message>, SyncError> {
    tracing::info!("Loading history for conversation {}", conversation);
    let records = api
        .fetch_history(conversation)
        .await
        .map_err(|e| SyncError::from_api(Operation::History, e))?;
    tracing::debug!("History for {}: {} records", conversation, records.len());
    Ok(records)
}

/// Insert fetched records, skipping any tagged for another conversation.
///
/// Returns how many records were new to the store.
pub fn seed(store: &mut MessageStore, records: Vec<Message>, conversation: &ConversationId) -> usize {
    let mut inserted = 0;
    for record in records {
        if let Some(ref scope) = record.conversation_id {
            if scope != conversation {
                tracing::warn!(
                    "History record {} belongs to {}, not {}",
                    record.id,
                    scope,
                    conversation
                );
                continue;
            }
        }
        if store.insert_if_absent(record).changed() {
            inserted += 1;
        }
    }
    inserted
}
