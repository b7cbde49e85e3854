//! Id-keyed message collection for the open conversation.
//!
//! Every creation path goes through [`MessageStore::insert_if_absent`], every
//! change through [`MessageStore::update_by_id`] and every removal through
//! [`MessageStore::remove_by_id`]. All three are total: duplicates, unknown ids
//! and stale patches resolve to a no-op [`Merge`] rather than an error.

use std::collections::{HashMap, HashSet};

use crate::models::{Message, MessageId, MessagePatch};

/// Outcome of a merge operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Inserted,
    Updated,
    Removed,
    /// A record with this id already exists.
    Duplicate,
    /// The patch carried nothing new.
    Unchanged,
    /// No record with this id has been seen.
    Absent,
    /// The id was removed earlier in this session.
    Tombstoned,
    /// The patch would revert a monotonic flag.
    Stale,
}

impl Merge {
    /// Whether the store contents changed.
    pub fn changed(self) -> bool {
        matches!(self, Merge::Inserted | Merge::Updated | Merge::Removed)
    }
}

#[derive(Debug, Default)]
pub struct MessageStore {
    /// Insertion order.
    records: Vec<Message>,
    index: HashMap<MessageId, usize>,
    removed: HashSet<MessageId>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `record` unless its id is already present or was removed.
    pub fn insert_if_absent(&mut self, record: Message) -> Merge {
        if self.index.contains_key(&record.id) {
            tracing::debug!("Ignoring duplicate message {}", record.id);
            return Merge::Duplicate;
        }
        if self.removed.contains(&record.id) {
            tracing::debug!("Ignoring insert of deleted message {}", record.id);
            return Merge::Tombstoned;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        Merge::Inserted
    }

    /// Merge `patch` into the record with `id`, if there is one.
    pub fn update_by_id(&mut self, id: &MessageId, patch: MessagePatch) -> Merge {
        let Some(&pos) = self.index.get(id) else {
            let outcome = if self.removed.contains(id) {
                Merge::Tombstoned
            } else {
                Merge::Absent
            };
            tracing::debug!("Update for unknown message {} ({:?})", id, outcome);
            return outcome;
        };
        let record = &mut self.records[pos];

        let reverts_read = patch.read == Some(false) && record.read;
        let reverts_edited = patch.edited == Some(false) && record.edited;
        if reverts_read || reverts_edited {
            tracing::debug!("Rejecting stale update for message {}", id);
            return Merge::Stale;
        }

        let mut changed = false;
        if let Some(body) = patch.body {
            if record.body != body {
                record.body = body;
                changed = true;
            }
        }
        if let Some(url) = patch.attachment_url {
            if record.attachment_url != url {
                record.attachment_url = url;
                changed = true;
            }
        }
        if patch.read == Some(true) && !record.read {
            record.read = true;
            changed = true;
        }
        if patch.edited == Some(true) && !record.edited {
            record.edited = true;
            changed = true;
        }

        if changed {
            Merge::Updated
        } else {
            Merge::Unchanged
        }
    }

    /// Remove the record with `id`. The id stays tombstoned until [`clear`](Self::clear)
    /// so late events cannot bring it back.
    pub fn remove_by_id(&mut self, id: &MessageId) -> Merge {
        let newly_tombstoned = self.removed.insert(id.clone());
        let Some(pos) = self.index.remove(id) else {
            return if newly_tombstoned {
                Merge::Absent
            } else {
                Merge::Tombstoned
            };
        };

        self.records.remove(pos);
        for record in &self.records[pos..] {
            if let Some(slot) = self.index.get_mut(&record.id) {
                *slot -= 1;
            }
        }
        Merge::Removed
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.records.iter()
    }

    /// Owned copy of the records in insertion order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records and tombstones.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.removed.clear();
    }
}
