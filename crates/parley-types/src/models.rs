use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageJson;
use crate::{ChannelId, MessageId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "PUBLIC")]
    Public,
    #[serde(rename = "PM")]
    PrivateMessage,
    #[serde(rename = "ANNOUNCE")]
    Announce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJson {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// One chat message as held by the client.
///
/// A message created locally has no server id until the server confirms it;
/// until then it is identified by `uuid` and flagged `pending`. A send that
/// failed keeps its content and is flagged `errored` so it can be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<MessageId>,
    pub uuid: Uuid,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_action: bool,
    pub pending: bool,
    pub errored: bool,
}

impl Message {
    pub fn from_json(json: &MessageJson) -> Self {
        Self {
            id: Some(json.message_id),
            uuid: json.uuid.unwrap_or_else(Uuid::new_v4),
            channel_id: json.channel_id,
            sender_id: json.sender_id,
            content: json.content.clone(),
            timestamp: json.timestamp,
            is_action: json.is_action,
            pending: false,
            errored: false,
        }
    }

    /// Optimistic message for a send that has not reached the server yet.
    pub fn new_pending(
        channel_id: ChannelId,
        sender_id: UserId,
        content: impl Into<String>,
        is_action: bool,
    ) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            channel_id,
            sender_id,
            content: content.into(),
            timestamp: Utc::now(),
            is_action,
            pending: true,
            errored: false,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }

    /// Merge the server's authoritative copy into this message.
    pub fn persist(&mut self, json: &MessageJson) {
        self.id = Some(json.message_id);
        self.channel_id = json.channel_id;
        self.content = json.content.clone();
        self.timestamp = json.timestamp;
        self.is_action = json.is_action;
        self.pending = false;
        self.errored = false;
    }

    /// The send failed. Content is kept so the UI can offer a retry.
    pub fn mark_failed(&mut self) {
        self.pending = false;
        self.errored = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(id: MessageId) -> MessageJson {
        MessageJson {
            message_id: id,
            channel_id: 1,
            sender_id: 2,
            sender: None,
            content: "server copy".into(),
            timestamp: Utc::now(),
            is_action: false,
            uuid: None,
        }
    }

    #[test]
    fn test_pending_then_persist() {
        let mut message = Message::new_pending(1, 2, "draft", false);
        assert!(message.pending);
        assert!(!message.is_confirmed());

        message.persist(&json(44));
        assert_eq!(message.id, Some(44));
        assert_eq!(message.content, "server copy");
        assert!(!message.pending);
        assert!(!message.errored);
    }

    #[test]
    fn test_mark_failed_keeps_content() {
        let mut message = Message::new_pending(1, 2, "draft", false);
        message.mark_failed();
        assert!(!message.pending);
        assert!(message.errored);
        assert_eq!(message.content, "draft");
        assert_eq!(message.id, None);
    }

    #[test]
    fn test_from_json_keeps_echoed_uuid() {
        let uuid = Uuid::new_v4();
        let mut wire = json(3);
        wire.uuid = Some(uuid);
        let message = Message::from_json(&wire);
        assert_eq!(message.uuid, uuid);
        assert_eq!(message.id, Some(3));
        assert!(!message.pending);
    }
}
