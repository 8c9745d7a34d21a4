use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChannelType, UserJson};
use crate::{ChannelId, MessageId, UserId};

// -- Channels --

/// Channel metadata as returned by the server. Presence payloads are a list
/// of these, carrying the current user's read state alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelJson {
    pub channel_id: ChannelId,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub moderated: bool,
    #[serde(default)]
    pub users: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_id: Option<MessageId>,
}

pub type PresenceJson = Vec<ChannelJson>;

// -- Messages --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageJson {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserJson>,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub is_action: bool,
    /// Echo of the client-generated id the message was sent with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest {
    pub message: String,
    pub is_action: bool,
    pub uuid: Uuid,
}

#[derive(Debug, Serialize)]
pub struct NewConversationRequest {
    pub target_id: UserId,
    pub message: String,
    pub is_action: bool,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConversationJson {
    pub channel: ChannelJson,
    pub message: MessageJson,
}

// -- Updates --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceJson {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: UserId,
}

/// Incremental sync payload returned by the updates endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetUpdatesJson {
    #[serde(default)]
    pub presence: PresenceJson,
    #[serde(default)]
    pub messages: Vec<MessageJson>,
    #[serde(default)]
    pub silences: Vec<SilenceJson>,
}
