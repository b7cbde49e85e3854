//! REST collaborator for conversation messages
//!
//! [`ChatApi`] is the seam the engine talks through; [`client::RestClient`]
//! implements it over HTTP.

pub mod client;

use async_trait::async_trait;

use crate::models::{ConversationId, Draft, Message, MessageId};

pub use client::RestClient;

/// Failure of a single REST call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("401 Unauthorized for {0}. Check the token set with 'operator-chat configure --token'.")]
    Unauthorized(String),
    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Operations the conversation engine needs from the backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Full history of a conversation, normalized; malformed records are skipped.
    async fn fetch_history(&self, conversation: &ConversationId) -> Result<Vec<Message>, ApiError>;

    /// Create a message and return the canonical record.
    async fn send_message(
        &self,
        conversation: &ConversationId,
        sender: &str,
        draft: &Draft,
    ) -> Result<Message, ApiError>;

    /// Replace a message's content and return the canonical record.
    async fn edit_message(
        &self,
        id: &MessageId,
        sender: &str,
        draft: &Draft,
    ) -> Result<Message, ApiError>;

    async fn delete_message(&self, id: &MessageId) -> Result<(), ApiError>;

    /// Mark an inbound message read. Some backends answer with the updated record.
    async fn acknowledge_read(&self, id: &MessageId) -> Result<Option<Message>, ApiError>;
}
