//! Live event decoding

use serde::Deserialize;
use serde_json::Value;

use crate::models::{normalize, ConversationId, Message, MessageId, WireMessage};

/// One change pushed by the live transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    NewMessage(Message),
    Edited {
        id: MessageId,
        conversation: Option<ConversationId>,
        body: Option<String>,
        attachment_url: Option<Option<String>>,
    },
    Read {
        id: MessageId,
        conversation: Option<ConversationId>,
    },
    Deleted {
        id: MessageId,
        conversation: Option<ConversationId>,
    },
}

impl LiveEvent {
    pub fn message_id(&self) -> &MessageId {
        match self {
            LiveEvent::NewMessage(msg) => &msg.id,
            LiveEvent::Edited { id, .. } | LiveEvent::Read { id, .. } | LiveEvent::Deleted { id, .. } => id,
        }
    }

    /// Scope tag carried by the event, if any.
    pub fn conversation(&self) -> Option<&ConversationId> {
        match self {
            LiveEvent::NewMessage(msg) => msg.conversation_id.as_ref(),
            LiveEvent::Edited { conversation, .. }
            | LiveEvent::Read { conversation, .. }
            | LiveEvent::Deleted { conversation, .. } => conversation.as_ref(),
        }
    }

    /// Untagged events are trusted to be pre-filtered by the transport.
    pub fn is_for(&self, active: &ConversationId) -> bool {
        self.conversation().map_or(true, |c| c == active)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::NewMessage(_) => "new-message",
            LiveEvent::Edited { .. } => "message-edited",
            LiveEvent::Read { .. } => "message-read",
            LiveEvent::Deleted { .. } => "message-deleted",
        }
    }
}

/// `{"event": "...", "data": {...}}`, also accepted as `type`/`payload`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(alias = "type")]
    event: String,
    #[serde(default, alias = "payload")]
    data: Value,
}

/// Decode a text frame. Control frames, unknown kinds and malformed payloads
/// yield `None`.
pub fn decode_frame(text: &str) -> Option<LiveEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(_) => {
            tracing::debug!("Ignoring non-event frame: {}", text);
            return None;
        }
    };

    let kind = envelope.event.as_str();
    if !matches!(
        kind,
        "new-message" | "message-edited" | "message-read" | "message-deleted"
    ) {
        tracing::debug!("Ignoring live event {}", kind);
        return None;
    }

    if !envelope.data.is_object() {
        tracing::warn!("Malformed {} payload: not an object", kind);
        return None;
    }
    let wire: WireMessage = match serde_json::from_value(envelope.data) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("Malformed {} payload: {}", kind, e);
            return None;
        }
    };

    if kind == "new-message" {
        return match normalize(wire) {
            Ok(msg) => Some(LiveEvent::NewMessage(msg)),
            Err(e) => {
                tracing::warn!("Dropping new-message event: {}", e);
                None
            }
        };
    }

    let Some(id) = wire.message_id() else {
        tracing::warn!("Dropping {} event without a message id", kind);
        return None;
    };
    let conversation = wire.conversation_id();

    Some(match kind {
        "message-edited" => LiveEvent::Edited {
            id,
            conversation,
            body: wire.body().map(String::from),
            attachment_url: wire.attachment_url(),
        },
        "message-read" => LiveEvent::Read { id, conversation },
        _ => LiveEvent::Deleted { id, conversation },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_new_message() {
        let ev = decode_frame(
            r#"{"event":"new-message","data":{"_id":"m1","conversationId":"c1","sender":"u1","body":"hi","createdAt":"2024-01-01T10:00:00Z"}}"#,
        )
        .unwrap();
        match ev {
            LiveEvent::NewMessage(ref msg) => {
                assert_eq!(msg.id.as_str(), "m1");
                assert_eq!(msg.body, "hi");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ev.is_for(&"c1".into()));
        assert!(!ev.is_for(&"c2".into()));
    }

    #[test]
    fn test_decode_edit_read_delete() {
        let edit = decode_frame(
            r#"{"type":"message-edited","payload":{"id":5,"body":"fixed","attachmentUrl":null}}"#,
        )
        .unwrap();
        assert_eq!(
            edit,
            LiveEvent::Edited {
                id: MessageId::new("5"),
                conversation: None,
                body: Some("fixed".to_string()),
                attachment_url: Some(None),
            }
        );

        let read = decode_frame(r#"{"event":"message-read","data":{"_id":"m2"}}"#).unwrap();
        assert_eq!(read.kind(), "message-read");
        assert_eq!(read.message_id().as_str(), "m2");
        assert!(read.is_for(&"any".into()));

        let deleted =
            decode_frame(r#"{"event":"message-deleted","data":{"id":"m3","conversationId":"c1"}}"#)
                .unwrap();
        assert_eq!(
            deleted,
            LiveEvent::Deleted {
                id: MessageId::new("m3"),
                conversation: Some(ConversationId::new("c1")),
            }
        );
    }

    #[test]
    fn test_decode_room_scoped_event() {
        let ev = decode_frame(
            r#"{"event":"new-message","data":{"id":"x1","roomId":"c2","message":"hi","createdAt":"2024-01-01T10:00:00Z"}}"#,
        )
        .unwrap();
        assert_eq!(ev.conversation(), Some(&ConversationId::new("c2")));
        assert!(!ev.is_for(&"c1".into()));
        match ev {
            LiveEvent::NewMessage(msg) => assert_eq!(msg.body, "hi"),
            other => panic!("unexpected {:?}", other),
        }

        let edit = decode_frame(
            r#"{"event":"message-edited","data":{"id":"x1","roomId":"c2","message":"fixed"}}"#,
        )
        .unwrap();
        assert!(!edit.is_for(&"c1".into()));
        assert!(matches!(edit, LiveEvent::Edited { body: Some(ref b), .. } if b == "fixed"));
    }

    #[test]
    fn test_decode_ignores_noise() {
        assert!(decode_frame(r#"{"event":"message-deleted","data":["m1","c1"]}"#).is_none());
        assert!(decode_frame(r#"{"action":"pong"}"#).is_none());
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame(r#"{"event":"typing","data":{"id":"m1"}}"#).is_none());
        assert!(decode_frame(r#"{"event":"message-read","data":{"body":"x"}}"#).is_none());
        assert!(decode_frame(r#"{"event":"new-message","data":{"id":"m1"}}"#).is_none());
    }
}
