//! Read acknowledgements for inbound messages.
//!
//! After each store mutation the driver scans for inbound unread records and
//! hands back the ids that still need an acknowledgement. An id is issued at
//! most once while its request is in flight; a failed id is parked until the
//! conversation is reopened.

use std::collections::HashSet;

use crate::models::MessageId;

use super::store::MessageStore;

#[derive(Debug, Default)]
pub struct ReadReceiptDriver {
    in_flight: HashSet<MessageId>,
    failed: HashSet<MessageId>,
}

impl ReadReceiptDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids that need an acknowledgement now. They are marked in flight.
    pub fn scan(&mut self, store: &MessageStore, operator: &str) -> Vec<MessageId> {
        let mut due = Vec::new();
        for record in store.iter() {
            if record.read || record.is_from(operator) {
                continue;
            }
            if self.is_in_flight(&record.id) || self.failed.contains(&record.id) {
                continue;
            }
            self.in_flight.insert(record.id.clone());
            due.push(record.id.clone());
        }
        if !due.is_empty() {
            tracing::debug!("Acknowledging {} unread message(s)", due.len());
        }
        due
    }

    pub fn acknowledged(&mut self, id: &MessageId) {
        self.in_flight.remove(id);
    }

    pub fn failed(&mut self, id: &MessageId) {
        self.in_flight.remove(id);
        self.failed.insert(id.clone());
    }

    pub fn is_in_flight(&self, id: &MessageId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn reset(&mut self) {
        self.in_flight.clear();
        self.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::tests::msg;
    use crate::models::MessagePatch;

    #[test]
    fn test_scan_skips_own_and_read() {
        let mut store = MessageStore::new();
        store.insert_if_absent(msg("m1", "u1", 0));
        store.insert_if_absent(msg("m2", "op", 1));
        let mut read = msg("m3", "u1", 2);
        read.read = true;
        store.insert_if_absent(read);

        let mut driver = ReadReceiptDriver::new();
        assert_eq!(driver.scan(&store, "op"), vec![MessageId::new("m1")]);
    }

    #[test]
    fn test_scan_does_not_reissue_in_flight() {
        let mut store = MessageStore::new();
        store.insert_if_absent(msg("m1", "u1", 0));
        let mut driver = ReadReceiptDriver::new();

        assert_eq!(driver.scan(&store, "op").len(), 1);
        store.insert_if_absent(msg("m2", "u1", 1));
        assert_eq!(driver.scan(&store, "op"), vec![MessageId::new("m2")]);
        assert!(driver.scan(&store, "op").is_empty());
    }

    #[test]
    fn test_acknowledged_and_read_is_not_reissued() {
        let mut store = MessageStore::new();
        store.insert_if_absent(msg("m1", "u1", 0));
        let mut driver = ReadReceiptDriver::new();
        let id = MessageId::new("m1");

        driver.scan(&store, "op");
        store.update_by_id(&id, MessagePatch::read());
        driver.acknowledged(&id);
        assert!(!driver.is_in_flight(&id));
        assert!(driver.scan(&store, "op").is_empty());
    }

    #[test]
    fn test_failed_is_parked_until_reset() {
        let mut store = MessageStore::new();
        store.insert_if_absent(msg("m1", "u1", 0));
        let mut driver = ReadReceiptDriver::new();
        let id = MessageId::new("m1");

        driver.scan(&store, "op");
        driver.failed(&id);
        assert!(driver.scan(&store, "op").is_empty());

        driver.reset();
        assert_eq!(driver.scan(&store, "op"), vec![id]);
    }
}
