//! Send-then-reconcile message composition.
//!
//! Nothing is echoed into the store before the server confirms; the
//! canonical record is folded in with `insert_if_absent`, so a live
//! "new-message" event that beats the response is harmless. Drafts of
//! outstanding sends are kept so a failure can hand the input back.

use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::models::Draft;

/// Handle for one outstanding send.
pub type Ticket = u64;

#[derive(Debug, Default)]
pub struct Composer {
    next_ticket: Ticket,
    pending: BTreeMap<Ticket, Draft>,
}

/// Reject drafts with neither text nor an attachment.
pub fn validate(draft: &Draft) -> Result<(), SyncError> {
    if draft.is_empty() {
        return Err(SyncError::validation(
            "Nothing to send: write a message or attach an image",
        ));
    }
    Ok(())
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a draft, returning its ticket.
    pub fn prepare(&mut self, draft: Draft) -> Result<(Ticket, Draft), SyncError> {
        validate(&draft)?;
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending.insert(ticket, draft.clone());
        Ok((ticket, draft))
    }

    /// The server accepted the send; the draft is no longer needed.
    pub fn confirmed(&mut self, ticket: Ticket) {
        self.pending.remove(&ticket);
    }

    /// The send failed; returns the draft so the operator can retry.
    pub fn failed(&mut self, ticket: Ticket) -> Option<Draft> {
        self.pending.remove(&ticket)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_rejects_empty() {
        let mut composer = Composer::new();
        let err = composer.prepare(Draft::text("  ")).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(composer.pending(), 0);
    }

    #[test]
    fn test_failed_returns_draft() {
        let mut composer = Composer::new();
        let (first, _) = composer.prepare(Draft::text("one")).unwrap();
        let (second, _) = composer.prepare(Draft::text("two")).unwrap();
        assert_ne!(first, second);

        composer.confirmed(first);
        assert_eq!(composer.failed(second), Some(Draft::text("two")));
        assert_eq!(composer.failed(second), None);
        assert_eq!(composer.pending(), 0);
    }
}
