//! Conversation scope and session lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle of the open conversation.
///
/// `Idle -> Loading -> Live -> Closing -> Idle`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// History fetch in flight.
    Loading,
    /// History settled, live events flowing.
    Live,
    /// Subscription being released and store cleared.
    Closing,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Loading => "loading",
            SessionPhase::Live => "live",
            SessionPhase::Closing => "closing",
        }
    }
}
