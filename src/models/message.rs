//! Message-related models
//!
//! Records cross the REST and live boundaries as [`WireMessage`] and are
//! turned into [`Message`] by [`normalize`], the only place that knows the
//! identity field can be spelled `id` or `_id`.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ConversationId;

/// Stable message identity, string-normalized at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A message in the active conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: Option<ConversationId>,
    pub sender: String,
    pub body: String,
    pub attachment_url: Option<String>,
    #[serde(rename = "readStatus")]
    pub read: bool,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether `operator` authored this message.
    pub fn is_from(&self, operator: &str) -> bool {
        self.sender == operator
    }
}

/// Field changes merged into an existing record by id.
///
/// `read` and `edited` may only move from `false` to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub body: Option<String>,
    /// `Some(None)` clears the attachment.
    pub attachment_url: Option<Option<String>>,
    pub read: Option<bool>,
    pub edited: Option<bool>,
}

impl MessagePatch {
    /// Patch for a read receipt.
    pub fn read() -> Self {
        Self {
            read: Some(true),
            ..Self::default()
        }
    }

    /// Patch for an edit; always marks the record edited.
    pub fn edit(body: Option<String>, attachment_url: Option<Option<String>>) -> Self {
        Self {
            body,
            attachment_url,
            read: None,
            edited: Some(true),
        }
    }

    /// Patch carrying the editable fields of a canonical record.
    pub fn from_canonical(record: &Message) -> Self {
        Self::edit(
            Some(record.body.clone()),
            Some(record.attachment_url.clone()),
        )
    }
}

/// Why a wire record could not be turned into a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("record has no usable id")]
    MissingId,
    #[error("record {0} has no createdAt")]
    MissingTimestamp(String),
    #[error("record {id} has unparseable createdAt {raw}")]
    InvalidTimestamp { id: String, raw: String },
    #[error("record is not a message object: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Message record as sent by the REST API or the live transport.
#[derive(Debug, Default, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "_id")]
    legacy_id: Option<Value>,
    #[serde(default, rename = "conversationId", alias = "conversation", alias = "roomId")]
    conversation_id: Option<Value>,
    #[serde(default, alias = "senderId")]
    sender: Option<Value>,
    #[serde(default, alias = "content", alias = "message")]
    body: Option<String>,
    #[serde(default, rename = "attachmentUrl", alias = "image", deserialize_with = "present")]
    attachment_url: Option<Option<String>>,
    #[serde(default, rename = "readStatus")]
    read_status: Option<bool>,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    edited: Option<bool>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<Value>,
}

/// Distinguish an explicit `null` from a missing key.
fn present<'de, D, T>(d: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

impl WireMessage {
    /// Canonical id, whichever field name the sender used.
    pub fn message_id(&self) -> Option<MessageId> {
        self.id
            .as_ref()
            .and_then(id_string)
            .or_else(|| self.legacy_id.as_ref().and_then(id_string))
            .map(MessageId)
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
            .as_ref()
            .and_then(id_string)
            .map(ConversationId::new)
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// `None` when the key was absent, `Some(None)` when it was `null`.
    pub fn attachment_url(&self) -> Option<Option<String>> {
        self.attachment_url
            .clone()
            .map(|url| url.filter(|u| !u.trim().is_empty()))
    }
}

/// Turn a wire record into the canonical [`Message`].
pub fn normalize(wire: WireMessage) -> Result<Message, NormalizeError> {
    let id = wire.message_id().ok_or(NormalizeError::MissingId)?;
    let conversation_id = wire.conversation_id();
    let attachment_url = wire.attachment_url().flatten();

    let raw_time = wire
        .created_at
        .ok_or_else(|| NormalizeError::MissingTimestamp(id.to_string()))?;
    let created_at = parse_timestamp(&raw_time).ok_or_else(|| NormalizeError::InvalidTimestamp {
        id: id.to_string(),
        raw: raw_time.to_string(),
    })?;

    Ok(Message {
        id,
        conversation_id,
        sender: wire.sender.as_ref().and_then(id_string).unwrap_or_default(),
        body: wire.body.unwrap_or_default(),
        attachment_url,
        read: wire.read_status.or(wire.read).unwrap_or(false),
        edited: wire.edited.unwrap_or(false),
        created_at,
    })
}

/// Deserialize and normalize a JSON record in one step.
///
/// Only JSON objects are records; serde would otherwise read arrays by position.
pub fn normalize_value(value: Value) -> Result<Message, NormalizeError> {
    if !value.is_object() {
        return Err(NormalizeError::Malformed(<serde_json::Error as serde::de::Error>::custom(format!(
            "expected an object, got {}",
            value
        ))));
    }
    let wire: WireMessage = serde_json::from_value(value)?;
    normalize(wire)
}

/// Identity values arrive as strings, numbers, or `{"$oid": "..."}` objects.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(id_string),
        _ => None,
    }
}

/// RFC 3339, zone-less ISO 8601 (taken as UTC), or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            s.parse::<i64>()
                .ok()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_legacy_id() {
        let msg = normalize_value(json!({
            "_id": "65a1f0",
            "sender": "u1",
            "body": "hi",
            "createdAt": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.id.as_str(), "65a1f0");
        assert_eq!(msg.sender, "u1");
        assert!(!msg.read);
        assert!(!msg.edited);
    }

    #[test]
    fn test_normalize_numeric_ids_match_string_ids() {
        let numeric = normalize_value(json!({
            "id": 42,
            "senderId": 7,
            "createdAt": 1704103200000i64
        }))
        .unwrap();
        let string = normalize_value(json!({
            "_id": "42",
            "sender": "7",
            "createdAt": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(numeric.id, string.id);
        assert_eq!(numeric.sender, string.sender);
        assert_eq!(numeric.created_at, string.created_at);
    }

    #[test]
    fn test_normalize_prefers_id_over_legacy() {
        let msg = normalize_value(json!({
            "id": "a",
            "_id": "b",
            "createdAt": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.id.as_str(), "a");
    }

    #[test]
    fn test_normalize_object_id_and_aliases() {
        let msg = normalize_value(json!({
            "_id": {"$oid": "abc"},
            "conversation": "c1",
            "content": "hello",
            "image": "https://cdn/x.png",
            "read": true,
            "createdAt": "2024-01-01T10:00:00.250"
        }))
        .unwrap();
        assert_eq!(msg.id.as_str(), "abc");
        assert_eq!(msg.conversation_id, Some(ConversationId::new("c1")));
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.attachment_url.as_deref(), Some("https://cdn/x.png"));
        assert!(msg.read);
    }

    #[test]
    fn test_normalize_rejects_missing_fields() {
        assert!(matches!(
            normalize_value(json!({"body": "x", "createdAt": "2024-01-01T10:00:00Z"})),
            Err(NormalizeError::MissingId)
        ));
        assert!(matches!(
            normalize_value(json!({"id": "m1"})),
            Err(NormalizeError::MissingTimestamp(_))
        ));
        assert!(matches!(
            normalize_value(json!({"id": "m1", "createdAt": "yesterday"})),
            Err(NormalizeError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            normalize_value(json!(["not", "an", "object"])),
            Err(NormalizeError::Malformed(_))
        ));
    }

    #[test]
    fn test_normalize_room_and_message_aliases() {
        let msg = normalize_value(json!({
            "id": "m1",
            "roomId": "c2",
            "message": "hi there",
            "createdAt": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.conversation_id, Some(ConversationId::new("c2")));
        assert_eq!(msg.body, "hi there");
    }

    #[test]
    fn test_normalize_rejects_positional_array() {
        // Slot 9 would be createdAt if arrays were read by position.
        let record = json!([
            "m1", null, "c1", "u1", "hi", null, null, null, null, "2024-01-01T10:00:00Z"
        ]);
        assert!(matches!(
            normalize_value(record),
            Err(NormalizeError::Malformed(_))
        ));
        assert!(matches!(
            normalize_value(json!("m1")),
            Err(NormalizeError::Malformed(_))
        ));
    }

    #[test]
    fn test_attachment_null_versus_absent() {
        let absent: WireMessage = serde_json::from_value(json!({"id": "m1"})).unwrap();
        assert_eq!(absent.attachment_url(), None);

        let cleared: WireMessage =
            serde_json::from_value(json!({"id": "m1", "attachmentUrl": null})).unwrap();
        assert_eq!(cleared.attachment_url(), Some(None));
    }
}
