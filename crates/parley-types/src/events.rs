use crate::api::{GetUpdatesJson, MessageJson, NewConversationJson};
use crate::models::{Message, UserJson};
use crate::{ChannelId, UserId};

/// Actions carried on the dispatch bus.
///
/// Actions produced by asynchronous work (a send or a sync poll) carry the
/// `session` epoch they were started under, so a result that lands after a
/// logout can be told apart from one belonging to the current session.
#[derive(Debug, Clone)]
pub enum ChatAction {
    /// User asked to send a message. The message is the optimistic copy.
    MessageSend { message: Message },

    /// A send resolved. `json` is `None` when the transport failed.
    MessageUpdate {
        message: Message,
        json: Option<MessageJson>,
        session: u64,
    },

    /// The server created the conversation a draft PM channel stood for.
    NewConversationCreated {
        draft_channel_id: ChannelId,
        response: NewConversationJson,
        session: u64,
    },

    /// Leave a channel. `should_sync` tells whether the server must be told.
    ChannelPart {
        channel_id: ChannelId,
        should_sync: bool,
    },

    /// Open a private conversation with `target`, as a local draft when none
    /// exists yet.
    PrivateChannelOpen {
        target: UserJson,
        current_user_id: UserId,
    },

    /// Request to bring a channel into view.
    ChannelSwitch { channel_id: ChannelId },

    ChannelMarkAsRead { channel_id: ChannelId },

    /// An incremental sync payload arrived from the server.
    UpdatesReceived {
        updates: GetUpdatesJson,
        session: u64,
    },

    UserLogout,
}

impl ChatAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MessageSend { .. } => "MessageSend",
            Self::MessageUpdate { .. } => "MessageUpdate",
            Self::NewConversationCreated { .. } => "NewConversationCreated",
            Self::ChannelPart { .. } => "ChannelPart",
            Self::PrivateChannelOpen { .. } => "PrivateChannelOpen",
            Self::ChannelSwitch { .. } => "ChannelSwitch",
            Self::ChannelMarkAsRead { .. } => "ChannelMarkAsRead",
            Self::UpdatesReceived { .. } => "UpdatesReceived",
            Self::UserLogout => "UserLogout",
        }
    }

    /// Returns the channel this action is scoped to, if any.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Self::MessageSend { message } => Some(message.channel_id),
            Self::MessageUpdate { message, .. } => Some(message.channel_id),
            Self::NewConversationCreated { draft_channel_id, .. } => Some(*draft_channel_id),
            Self::ChannelPart { channel_id, .. } => Some(*channel_id),
            Self::ChannelSwitch { channel_id } => Some(*channel_id),
            Self::ChannelMarkAsRead { channel_id } => Some(*channel_id),
            Self::PrivateChannelOpen { .. } | Self::UpdatesReceived { .. } | Self::UserLogout => None,
        }
    }
}
