//! Day-grouped view of a store snapshot.
//!
//! Everything here is a pure function of the snapshot, the operator id and
//! the display time zone. Nothing is cached between renders.

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::models::{ConversationId, Message, MessageId, SessionPhase};

/// Which side of the thread a bubble sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Written by the operator.
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub sender: String,
    pub body: String,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Local wall-clock time, `HH:MM`.
    pub time: String,
    pub side: Side,
    pub read: bool,
    pub edited: bool,
    pub can_manage: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub day: NaiveDate,
    pub messages: Vec<MessageView>,
}

impl DayGroup {
    pub fn label(&self) -> String {
        self.day.format("%A, %-d %B %Y").to_string()
    }
}

/// Render-ready state of the open conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationView {
    pub conversation: Option<ConversationId>,
    pub phase: SessionPhase,
    pub days: Vec<DayGroup>,
    /// A new message arrived at the tail since the previous view.
    pub appended: bool,
}

impl ConversationView {
    pub fn messages(&self) -> impl Iterator<Item = &MessageView> {
        self.days.iter().flat_map(|d| d.messages.iter())
    }

    pub fn len(&self) -> usize {
        self.days.iter().map(|d| d.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Newest message, used to detect appends.
    pub fn tail(&self) -> Option<&MessageView> {
        self.days.last().and_then(|d| d.messages.last())
    }
}

/// Whether the context menu applies: own messages, or any message with an image.
pub fn can_manage(message: &Message, operator: &str) -> bool {
    message.is_from(operator) || message.attachment_url.is_some()
}

/// Group `snapshot` by local calendar day, oldest first.
///
/// Ties on `created_at` keep insertion order.
pub fn present<Tz>(snapshot: &[Message], operator: &str, tz: &Tz) -> Vec<DayGroup>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut ordered: Vec<&Message> = snapshot.iter().collect();
    ordered.sort_by_key(|m| m.created_at);

    let mut days: Vec<DayGroup> = Vec::new();
    for message in ordered {
        let local = message.created_at.with_timezone(tz);
        let day = local.date_naive();
        let view = MessageView {
            id: message.id.clone(),
            sender: message.sender.clone(),
            body: message.body.clone(),
            attachment_url: message.attachment_url.clone(),
            created_at: message.created_at,
            time: local.format("%H:%M").to_string(),
            side: if message.is_from(operator) {
                Side::Sent
            } else {
                Side::Received
            },
            read: message.read,
            edited: message.edited,
            can_manage: can_manage(message, operator),
        };

        match days.last_mut() {
            Some(group) if group.day == day => group.messages.push(view),
            _ => days.push(DayGroup {
                day,
                messages: vec![view],
            }),
        }
    }
    days
}

/// Whether `days` ends with a message newer than `previous_tail`.
///
/// Removing or editing the last message is not an append.
pub fn appended(previous_tail: Option<&(MessageId, DateTime<Utc>)>, days: &[DayGroup]) -> bool {
    let Some(tail) = days.last().and_then(|d| d.messages.last()) else {
        return false;
    };
    match previous_tail {
        None => true,
        Some((id, at)) => &tail.id != id && tail.created_at >= *at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::tests::msg;
    use chrono::FixedOffset;

    fn at(id: &str, sender: &str, rfc3339: &str) -> Message {
        let mut m = msg(id, sender, 0);
        m.created_at = DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc);
        m
    }

    #[test]
    fn test_local_midnight_splits_days() {
        // 23:59 and 00:01 local time at UTC+2.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let snapshot = vec![
            at("late", "u1", "2024-01-01T21:59:00Z"),
            at("early", "u1", "2024-01-01T22:01:00Z"),
        ];

        let days = present(&snapshot, "op", &tz);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(days[1].day, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(days[0].messages[0].time, "23:59");
        assert_eq!(days[1].messages[0].time, "00:01");
    }

    #[test]
    fn test_same_instants_group_by_zone() {
        let snapshot = vec![
            at("a", "u1", "2024-01-01T21:59:00Z"),
            at("b", "u1", "2024-01-01T22:01:00Z"),
        ];
        assert_eq!(present(&snapshot, "op", &Utc).len(), 1);
    }

    #[test]
    fn test_orders_by_created_at_not_insertion() {
        let snapshot = vec![
            at("m3", "u1", "2024-01-02T09:00:00Z"),
            at("m1", "u1", "2024-01-01T09:00:00Z"),
            at("m2", "op", "2024-01-01T08:00:00Z"),
            at("m4", "u1", "2024-01-01T09:00:00Z"),
        ];

        let days = present(&snapshot, "op", &Utc);
        let order: Vec<Vec<&str>> = days
            .iter()
            .map(|d| d.messages.iter().map(|m| m.id.as_str()).collect())
            .collect();
        assert_eq!(order, vec![vec!["m2", "m1", "m4"], vec!["m3"]]);

        for day in &days {
            assert!(day
                .messages
                .windows(2)
                .all(|w| w[0].created_at <= w[1].created_at));
        }
    }

    #[test]
    fn test_side_and_capabilities() {
        let mut image = at("img", "u1", "2024-01-01T10:00:00Z");
        image.attachment_url = Some("https://cdn/p.png".to_string());
        let snapshot = vec![
            at("own", "op", "2024-01-01T09:00:00Z"),
            at("plain", "u1", "2024-01-01T09:30:00Z"),
            image,
        ];

        let days = present(&snapshot, "op", &Utc);
        let views = &days[0].messages;
        assert_eq!(views[0].side, Side::Sent);
        assert!(views[0].can_manage);
        assert_eq!(views[1].side, Side::Received);
        assert!(!views[1].can_manage);
        assert!(views[2].can_manage);
    }

    #[test]
    fn test_present_is_repeatable() {
        let snapshot = vec![
            at("a", "u1", "2024-01-01T10:00:00Z"),
            at("b", "op", "2024-01-01T11:00:00Z"),
        ];
        assert_eq!(
            present(&snapshot, "op", &Utc),
            present(&snapshot, "op", &Utc)
        );
    }

    #[test]
    fn test_appended_detection() {
        let first = present(&[at("a", "u1", "2024-01-01T10:00:00Z")], "op", &Utc);
        assert!(appended(None, &first));
        assert!(!appended(None, &[]));

        let tail = (MessageId::new("a"), first[0].messages[0].created_at);
        assert!(!appended(Some(&tail), &first));

        let grown = present(
            &[
                at("a", "u1", "2024-01-01T10:00:00Z"),
                at("b", "u1", "2024-01-01T10:05:00Z"),
            ],
            "op",
            &Utc,
        );
        assert!(appended(Some(&tail), &grown));

        // Deleting the newest message exposes an older tail.
        let newest = (MessageId::new("b"), grown[0].messages[1].created_at);
        assert!(!appended(Some(&newest), &first));
    }

    #[test]
    fn test_day_label() {
        let group = DayGroup {
            day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            messages: Vec::new(),
        };
        assert_eq!(group.label(), "Monday, 1 January 2024");
    }
}
