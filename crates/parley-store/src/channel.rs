use std::collections::{BTreeSet, HashSet};

use parley_types::api::{ChannelJson, MessageJson};
use parley_types::models::{ChannelType, Message};
use parley_types::{ChannelId, MessageId, UserId};

/// One conversation: its metadata, read state and loaded message history.
///
/// `messages` holds confirmed messages ascending by server id, followed by
/// pending (or failed) messages in the order they were sent. No server id
/// and no uuid appears twice.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub channel_type: ChannelType,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub moderated: bool,
    pub users: BTreeSet<UserId>,
    pub last_read_id: Option<MessageId>,
    /// Metadata received from the server at least once.
    pub meta_loaded: bool,
    /// Message history received from the server at least once.
    pub loaded: bool,
    /// Local private-message draft the server does not know about yet.
    pub new_pm_channel: bool,
    messages: Vec<Message>,
    last_message_id: MessageId,
}

impl Channel {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            channel_type: ChannelType::Public,
            name: String::new(),
            description: None,
            icon: None,
            moderated: false,
            users: BTreeSet::new(),
            last_read_id: None,
            meta_loaded: false,
            loaded: false,
            new_pm_channel: false,
            messages: Vec::new(),
            last_message_id: -1,
        }
    }

    /// Draft PM channel between the current user and `target`.
    pub fn new_pm_draft(
        channel_id: ChannelId,
        current_user_id: UserId,
        target_id: UserId,
        name: impl Into<String>,
    ) -> Self {
        let mut channel = Self::new(channel_id);
        channel.channel_type = ChannelType::PrivateMessage;
        channel.name = name.into();
        channel.users = [current_user_id, target_id].into_iter().collect();
        channel.new_pm_channel = true;
        channel.loaded = true;
        channel
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Highest confirmed message id, or -1 when there is none.
    pub fn last_message_id(&self) -> MessageId {
        self.last_message_id
    }

    /// Oldest confirmed message id; the cursor for fetching earlier history.
    pub fn first_message_id(&self) -> Option<MessageId> {
        self.messages.iter().find_map(|m| m.id)
    }

    pub fn is_private(&self) -> bool {
        self.channel_type == ChannelType::PrivateMessage
    }

    pub fn is_unread(&self) -> bool {
        self.last_message_id > self.last_read_id.unwrap_or(-1)
    }

    /// Merge messages into the history, skipping any already present.
    ///
    /// A confirmed message carrying the uuid of a pending one takes its place.
    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        let mut known_ids: HashSet<MessageId> = self.messages.iter().filter_map(|m| m.id).collect();
        let mut changed = false;

        for message in messages {
            match message.id {
                Some(id) => {
                    if !known_ids.insert(id) {
                        continue;
                    }
                    let pending = self
                        .messages
                        .iter_mut()
                        .find(|m| !m.is_confirmed() && m.uuid == message.uuid);
                    match pending {
                        Some(slot) => *slot = message,
                        None => self.messages.push(message),
                    }
                }
                None => {
                    if self.messages.iter().any(|m| m.uuid == message.uuid) {
                        continue;
                    }
                    self.messages.push(message);
                }
            }
            changed = true;
        }

        if changed {
            self.resort_messages();
        }
    }

    /// Append the optimistic copy of a message being sent.
    pub fn add_sending_message(&mut self, mut message: Message) {
        message.pending = true;
        message.errored = false;
        self.add_messages([message]);
    }

    /// Reconcile a previously sent message with the server's answer.
    ///
    /// `None` means the send failed: the message stays, flagged as errored.
    pub fn update_message(&mut self, message: &Message, json: Option<&MessageJson>) {
        let Some(index) = self.messages.iter().position(|m| m.uuid == message.uuid) else {
            return;
        };

        match json {
            Some(json) => {
                let duplicate = self
                    .messages
                    .iter()
                    .enumerate()
                    .any(|(i, m)| i != index && m.id == Some(json.message_id));
                if duplicate {
                    // sync delivered the confirmed copy first
                    self.messages.remove(index);
                } else {
                    self.messages[index].persist(json);
                }
            }
            None => self.messages[index].mark_failed(),
        }

        self.resort_messages();
    }

    /// Mark every message still awaiting a send result as failed. Returns how
    /// many were affected.
    pub fn fail_pending(&mut self) -> usize {
        let mut failed = 0;
        for message in self.messages.iter_mut().filter(|m| m.pending) {
            message.mark_failed();
            failed += 1;
        }
        failed
    }

    /// Apply channel metadata from the server.
    pub fn update_with_json(&mut self, json: &ChannelJson) {
        self.channel_type = json.channel_type;
        self.name = json.name.clone();
        self.description = json.description.clone();
        self.icon = json.icon.clone();
        self.moderated = json.moderated;
        self.users = json.users.iter().copied().collect();
        self.meta_loaded = true;
    }

    /// Apply a presence entry. Message history is left untouched.
    pub fn update_presence(&mut self, json: &ChannelJson) {
        self.update_with_json(json);
        if let Some(last_read_id) = json.last_read_id {
            self.last_read_id = Some(last_read_id);
        }
    }

    pub fn remove_messages_from_user_ids(&mut self, user_ids: &HashSet<UserId>) {
        let before = self.messages.len();
        self.messages.retain(|m| !user_ids.contains(&m.sender_id));
        if self.messages.len() != before {
            self.refresh_last_message_id();
        }
    }

    /// Advance the read marker to the newest message. Returns the new marker
    /// when it moved.
    pub fn mark_as_read(&mut self) -> Option<MessageId> {
        if !self.is_unread() {
            return None;
        }
        self.last_read_id = Some(self.last_message_id);
        self.last_read_id
    }

    pub fn resort_messages(&mut self) {
        // stable: pending messages keep their send order
        self.messages
            .sort_by_key(|m| (m.id.is_none(), m.id.unwrap_or_default()));
        self.refresh_last_message_id();
    }

    fn refresh_last_message_id(&mut self) {
        self.last_message_id = self.messages.iter().filter_map(|m| m.id).max().unwrap_or(-1);
    }
}
