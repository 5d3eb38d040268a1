use crate::feedback::ClearTag;
use crate::llm_client::{ChatMessage, ChatRole};
use crate::speech::AudioHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a message within a session. Derived from the creation time in
/// milliseconds, bumped when two messages land in the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Returns the next id after `last`, based on `now`.
    pub(crate) fn next(last: Option<MessageId>, now: DateTime<Utc>) -> MessageId {
        let candidate = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        match last {
            Some(MessageId(prev)) if candidate <= prev => MessageId(prev + 1),
            _ => MessageId(candidate),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Avatar,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Avatar => write!(f, "avatar"),
        }
    }
}

/// A message owned by the session. Only `audio` changes after creation.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub clear_components: Option<Vec<ClearTag>>,
    pub audio: Option<AudioHandle>,
}

impl Message {
    pub(crate) fn user(id: MessageId, content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            sender: Sender::User,
            content,
            timestamp,
            clear_components: None,
            audio: None,
        }
    }

    pub(crate) fn avatar(
        id: MessageId,
        content: String,
        timestamp: DateTime<Utc>,
        clear_components: Option<Vec<ClearTag>>,
    ) -> Self {
        Self {
            id,
            sender: Sender::Avatar,
            content,
            timestamp,
            clear_components,
            audio: None,
        }
    }

    /// The role this message plays in the outbound chat history.
    pub fn to_chat_message(&self) -> ChatMessage {
        let role = match self.sender {
            Sender::User => ChatRole::User,
            Sender::Avatar => ChatRole::Assistant,
        };
        ChatMessage::new(role, self.content.clone())
    }

    pub fn snapshot(&self, currently_playing: Option<MessageId>) -> MessageSnapshot {
        MessageSnapshot {
            id: self.id,
            sender: self.sender,
            content: self.content.clone(),
            timestamp: self.timestamp,
            clear_components: self.clear_components.clone(),
            has_audio: self.audio.is_some(),
            is_playing: currently_playing == Some(self.id),
        }
    }
}

/// A read-only view of a message for presentation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_components: Option<Vec<ClearTag>>,
    pub has_audio: bool,
    pub is_playing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ids_follow_the_clock() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let first = MessageId::next(None, t);
        assert_eq!(first.0, t.timestamp_millis() as u64);

        let later = t + chrono::Duration::milliseconds(5);
        assert_eq!(MessageId::next(Some(first), later).0, first.0 + 5);
    }

    #[test]
    fn test_ids_stay_monotonic_within_a_millisecond() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let first = MessageId::next(None, t);
        let second = MessageId::next(Some(first), t);
        let third = MessageId::next(Some(second), t - chrono::Duration::seconds(1));
        assert!(first < second && second < third);
    }

    #[test]
    fn test_sender_maps_to_chat_role() {
        let now = Utc::now();
        let user = Message::user(MessageId(1), "hi".into(), now);
        let avatar = Message::avatar(MessageId(2), "hello".into(), now, None);
        assert_eq!(user.to_chat_message().role, ChatRole::User);
        assert_eq!(avatar.to_chat_message().role, ChatRole::Assistant);
        assert_eq!(Sender::Avatar.to_string(), "avatar");
    }

    #[test]
    fn test_snapshot_serialization() {
        let now = Utc::now();
        let message = Message::avatar(
            MessageId(42),
            "Tell me more".into(),
            now,
            Some(vec![ClearTag::Listen]),
        );
        let json = serde_json::to_value(message.snapshot(Some(MessageId(42)))).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["sender"], "avatar");
        assert_eq!(json["clear_components"][0], "Listen");
        assert_eq!(json["has_audio"], false);
        assert_eq!(json["is_playing"], true);
    }
}
