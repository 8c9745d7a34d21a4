use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_types::api::{ChannelJson, GetUpdatesJson, MessageJson, NewConversationJson};
use parley_types::events::ChatAction;
use parley_types::models::{Message, UserJson};
use parley_types::{ChannelId, MessageId, UserId};

use crate::api::ChatApi;
use crate::channel::Channel;
use crate::dispatcher::Dispatcher;
use crate::users::UserStore;

/// Snapshot published to change subscribers after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    pub version: u64,
    pub max_message_id: MessageId,
    pub loaded: bool,
    pub session: u64,
    /// False once the user logged out; pollers hold off until it flips back.
    pub signed_in: bool,
}

struct Entry {
    /// Creation order, so equal-ranked channels keep a stable order.
    seq: u64,
    channel: Channel,
}

/// Every channel visible to the current session.
///
/// All mutation goes through `&mut self`; whoever owns the store serializes
/// access. The only asynchronous work is the network half of a message send,
/// which runs on a spawned task and reports back by dispatching an action.
pub struct ChannelStore {
    channels: HashMap<ChannelId, Entry>,
    next_seq: u64,
    pub loaded: bool,
    signed_in: bool,
    users: UserStore,
    dispatcher: Dispatcher,
    api: Arc<dyn ChatApi>,
    /// Bumped on every flush; results of work started in older sessions are dropped.
    session: u64,
    session_cancel: CancellationToken,
    version: u64,
    changes: watch::Sender<StoreStatus>,
}

impl ChannelStore {
    pub fn new(dispatcher: Dispatcher, api: Arc<dyn ChatApi>) -> Self {
        let (changes, _) = watch::channel(StoreStatus {
            version: 0,
            max_message_id: -1,
            loaded: false,
            session: 0,
            signed_in: true,
        });
        Self {
            channels: HashMap::new(),
            next_seq: 0,
            loaded: false,
            signed_in: true,
            users: UserStore::new(),
            dispatcher,
            api,
            session: 0,
            session_cancel: CancellationToken::new(),
            version: 0,
            changes,
        }
    }

    // -- Change notification --

    pub fn subscribe_changes(&self) -> watch::Receiver<StoreStatus> {
        self.changes.subscribe()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    fn publish(&mut self) {
        self.version += 1;
        let status = StoreStatus {
            version: self.version,
            max_message_id: self.max_message_id(),
            loaded: self.loaded,
            session: self.session,
            signed_in: self.signed_in,
        };
        self.changes.send_replace(status);
    }

    // -- Derived views --

    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.channels.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
    }

    /// Public and announce channels with loaded metadata, by name.
    pub fn non_pm_channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> = self
            .ordered()
            .into_iter()
            .map(|e| &e.channel)
            .filter(|c| !c.is_private() && c.meta_loaded)
            .collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    /// Drafts first, then loaded PM channels with the most recent activity first.
    pub fn pm_channels(&self) -> Vec<&Channel> {
        let mut channels: Vec<&Channel> = self
            .ordered()
            .into_iter()
            .map(|e| &e.channel)
            .filter(|c| c.new_pm_channel || (c.is_private() && c.meta_loaded))
            .collect();
        channels.sort_by(|a, b| match (a.new_pm_channel, b.new_pm_channel) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => b.last_message_id().cmp(&a.last_message_id()),
        });
        channels
    }

    pub fn channel_list(&self) -> Vec<&Channel> {
        let mut list = self.non_pm_channels();
        list.extend(self.pm_channels());
        list
    }

    /// Sync watermark: highest message id across all channels, -1 if none.
    pub fn max_message_id(&self) -> MessageId {
        self.channels
            .values()
            .map(|e| e.channel.last_message_id())
            .max()
            .unwrap_or(-1)
    }

    // -- Channel bookkeeping --

    pub fn get(&self, channel_id: ChannelId) -> Option<&Channel> {
        self.channels.get(&channel_id).map(|e| &e.channel)
    }

    pub fn get_mut(&mut self, channel_id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&channel_id).map(|e| &mut e.channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get_or_create(&mut self, channel_id: ChannelId) -> &mut Channel {
        if !self.channels.contains_key(&channel_id) {
            self.insert(Channel::new(channel_id));
        }
        &mut self
            .channels
            .get_mut(&channel_id)
            .expect("channel registered above")
            .channel
    }

    fn insert(&mut self, channel: Channel) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.channels.insert(channel.channel_id, Entry { seq, channel });
        self.publish();
    }

    pub fn add_messages(&mut self, channel_id: ChannelId, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        self.get_or_create(channel_id).add_messages(messages);
        self.publish();
    }

    /// First PM channel shared with `user_id`. Never matches the current
    /// user, who cannot have a conversation with themselves.
    pub fn find_pm(&self, user_id: UserId, current_user_id: UserId) -> Option<&Channel> {
        if user_id == current_user_id {
            return None;
        }
        self.ordered()
            .into_iter()
            .map(|e| &e.channel)
            .find(|c| c.is_private() && c.users.contains(&user_id))
    }

    /// Register a local PM draft with `target`, or return the channel that
    /// already covers the conversation.
    pub fn create_pm_draft(&mut self, target: &UserJson, current_user_id: UserId) -> Option<ChannelId> {
        if let Some(existing) = self.find_pm(target.id, current_user_id) {
            return Some(existing.channel_id);
        }
        if target.id == current_user_id {
            return None;
        }

        // drafts live in the negative id space the server never hands out
        let draft_id = -target.id;
        self.insert(Channel::new_pm_draft(
            draft_id,
            current_user_id,
            target.id,
            target.username.clone(),
        ));
        Some(draft_id)
    }

    /// Register a PM channel the server just created, with `message` as its
    /// first (and already read) message.
    pub fn add_new_conversation(&mut self, json: &ChannelJson, message: &MessageJson) -> &mut Channel {
        let channel_id = json.channel_id;
        let channel = self.get_or_create(channel_id);
        channel.update_with_json(json);
        channel.add_messages([Message::from_json(message)]);
        channel.last_read_id = Some(message.message_id);
        channel.loaded = true;
        self.publish();
        &mut self
            .channels
            .get_mut(&channel_id)
            .expect("channel registered above")
            .channel
    }

    pub fn part_channel(&mut self, channel_id: ChannelId) -> Option<Channel> {
        let removed = self.channels.remove(&channel_id).map(|e| e.channel);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Drop all session state. In-flight requests are cancelled and any
    /// result still on its way is ignored.
    pub fn flush_store(&mut self) {
        info!("flushing channel store ({} channels)", self.channels.len());
        self.channels.clear();
        self.loaded = false;
        self.session_cancel.cancel();
        self.session_cancel = CancellationToken::new();
        self.session += 1;
        self.publish();
    }

    // -- Server updates --

    /// Apply a presence list. Channels missing from it are parted through the
    /// dispatcher; local drafts are exempt since the server does not know them.
    pub fn update_with_presence(&mut self, presence: &[ChannelJson]) {
        for json in presence {
            self.get_or_create(json.channel_id).update_presence(json);
        }

        let present: HashSet<ChannelId> = presence.iter().map(|json| json.channel_id).collect();
        let parted: Vec<ChannelId> = self
            .ordered()
            .into_iter()
            .map(|e| &e.channel)
            .filter(|c| !c.new_pm_channel && !present.contains(&c.channel_id))
            .map(|c| c.channel_id)
            .collect();
        for channel_id in parted {
            debug!("channel {} no longer in presence", channel_id);
            self.dispatcher.dispatch(ChatAction::ChannelPart {
                channel_id,
                should_sync: false,
            });
        }

        self.loaded = true;
        self.publish();
    }

    /// Apply an incremental sync payload: presence first, then new messages
    /// per channel, then silences.
    pub fn update_with_json(&mut self, updates: &GetUpdatesJson) {
        self.update_with_presence(&updates.presence);

        let mut groups: BTreeMap<ChannelId, Vec<&MessageJson>> = BTreeMap::new();
        for json in &updates.messages {
            groups.entry(json.channel_id).or_default().push(json);
        }
        for (channel_id, jsons) in groups {
            self.handle_new_messages(channel_id, &jsons);
        }

        let silenced: HashSet<UserId> = updates.silences.iter().map(|s| s.user_id).collect();
        if !silenced.is_empty() {
            self.remove_public_messages_from_user_ids(&silenced);
        }

        self.publish();
    }

    fn handle_new_messages(&mut self, channel_id: ChannelId, jsons: &[&MessageJson]) {
        for json in jsons {
            if let Some(sender) = &json.sender {
                self.users.get_or_create(json.sender_id, sender);
            }
        }

        if jsons.is_empty() {
            return;
        }

        // TODO: decide with the server contract whether unknown channels
        // should be created here instead of dropping their messages.
        let Some(channel) = self.get_mut(channel_id) else {
            debug!("dropping {} messages for unknown channel {}", jsons.len(), channel_id);
            return;
        };

        channel.add_messages(jsons.iter().map(|json| Message::from_json(json)));
        channel.loaded = true;
    }

    /// Give up on every send still awaiting its result. Returns how many
    /// messages were marked failed.
    pub fn fail_pending_messages(&mut self) -> usize {
        let failed: usize = self
            .channels
            .values_mut()
            .map(|e| e.channel.fail_pending())
            .sum();
        if failed > 0 {
            self.publish();
        }
        failed
    }

    fn remove_public_messages_from_user_ids(&mut self, user_ids: &HashSet<UserId>) {
        for entry in self.channels.values_mut() {
            let channel = &mut entry.channel;
            if !channel.is_private() && channel.meta_loaded {
                channel.remove_messages_from_user_ids(user_ids);
            }
        }
    }

    // -- Dispatch --

    pub fn handle_dispatch_action(&mut self, action: ChatAction) {
        debug!("handling {} (channel {:?})", action.tag(), action.channel_id());

        match action {
            ChatAction::MessageSend { message } => self.handle_message_send(message),

            ChatAction::MessageUpdate { message, json, session } => {
                if session != self.session {
                    debug!("ignoring message update from stale session {}", session);
                    return;
                }
                // the channel may have been parted while the send was in flight
                let Some(channel) = self.get_mut(message.channel_id) else {
                    debug!("ignoring message update for parted channel {}", message.channel_id);
                    return;
                };
                channel.update_message(&message, json.as_ref());
                self.publish();
            }

            ChatAction::NewConversationCreated {
                draft_channel_id,
                response,
                session,
            } => {
                if session != self.session {
                    debug!("ignoring new conversation from stale session {}", session);
                    return;
                }
                self.handle_new_conversation(draft_channel_id, response);
            }

            ChatAction::ChannelPart { channel_id, should_sync } => {
                self.part_channel(channel_id);
                if should_sync {
                    self.spawn_part(channel_id);
                }
            }

            ChatAction::PrivateChannelOpen { target, current_user_id } => {
                match self.create_pm_draft(&target, current_user_id) {
                    Some(channel_id) => self.dispatcher.dispatch(ChatAction::ChannelSwitch { channel_id }),
                    None => debug!("no private channel with self ({})", target.id),
                }
            }

            ChatAction::ChannelMarkAsRead { channel_id } => {
                let marked = self.get_mut(channel_id).and_then(|c| c.mark_as_read());
                if let Some(message_id) = marked {
                    self.publish();
                    self.spawn_mark_as_read(channel_id, message_id);
                }
            }

            ChatAction::UpdatesReceived { updates, session } => {
                if session != self.session || !self.signed_in {
                    debug!("ignoring updates polled in session {}", session);
                    return;
                }
                self.update_with_json(&updates);
            }

            ChatAction::UserLogout => {
                self.signed_in = false;
                self.flush_store();
            }

            ChatAction::ChannelSwitch { .. } => {}
        }
    }

    /// Consume actions until `shutdown` fires or the bus closes, calling
    /// `on_change` whenever an action changed the store. Actions already
    /// queued are handled before shutting down.
    ///
    /// Falling behind the bus loses actions, possibly send results, so every
    /// message still pending at that point is marked failed.
    pub async fn run<F>(
        &mut self,
        mut actions: broadcast::Receiver<ChatAction>,
        shutdown: CancellationToken,
        mut on_change: F,
    ) where
        F: FnMut(&ChannelStore),
    {
        loop {
            let received = tokio::select! {
                biased;
                received = actions.recv() => received,
                _ = shutdown.cancelled() => break,
            };
            let action = match received {
                Ok(action) => action,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    let failed = self.fail_pending_messages();
                    warn!(
                        "store lagged behind the dispatcher by {} actions, {} pending sends marked failed",
                        n, failed
                    );
                    if failed > 0 {
                        on_change(self);
                    }
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let before = self.version;
            self.handle_dispatch_action(action);
            if self.version != before {
                on_change(self);
            }
        }
    }

    fn handle_new_conversation(&mut self, draft_channel_id: ChannelId, response: NewConversationJson) {
        self.channels.remove(&draft_channel_id);
        let channel_id = self
            .add_new_conversation(&response.channel, &response.message)
            .channel_id;
        info!("conversation {} replaces draft {}", channel_id, draft_channel_id);
        self.dispatcher.dispatch(ChatAction::ChannelSwitch { channel_id });
    }

    fn handle_message_send(&mut self, message: Message) {
        let channel = self.get_or_create(message.channel_id);
        channel.add_sending_message(message.clone());

        // the sender of an outgoing message is the session's own user
        let draft_target = channel
            .new_pm_channel
            .then(|| channel.users.iter().copied().find(|u| *u != message.sender_id));
        self.publish();

        let api = self.api.clone();
        let dispatcher = self.dispatcher.clone();
        let cancel = self.session_cancel.clone();
        let session = self.session;

        match draft_target {
            Some(None) => {
                debug!("send: draft channel {} has no target user", message.channel_id);
            }
            Some(Some(target)) => {
                tokio::spawn(async move {
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return,
                        result = api.new_conversation(target, &message) => result,
                    };
                    match result {
                        Ok(response) => dispatcher.dispatch(ChatAction::NewConversationCreated {
                            draft_channel_id: message.channel_id,
                            response,
                            session,
                        }),
                        Err(e) => {
                            warn!("new conversation with {} failed: {}", target, e);
                            dispatcher.dispatch(ChatAction::MessageUpdate {
                                message,
                                json: None,
                                session,
                            });
                        }
                    }
                });
            }
            None => {
                tokio::spawn(async move {
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return,
                        result = api.send_message(&message) => result,
                    };
                    let json = match result {
                        Ok(json) => Some(json),
                        Err(e) => {
                            warn!("send to channel {} failed: {}", message.channel_id, e);
                            None
                        }
                    };
                    dispatcher.dispatch(ChatAction::MessageUpdate { message, json, session });
                });
            }
        }
    }

    fn spawn_part(&self, channel_id: ChannelId) {
        let api = self.api.clone();
        let cancel = self.session_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = api.part_channel(channel_id) => {
                    if let Err(e) = result {
                        warn!("leaving channel {} failed: {}", channel_id, e);
                    }
                }
            }
        });
    }

    fn spawn_mark_as_read(&self, channel_id: ChannelId, message_id: MessageId) {
        let api = self.api.clone();
        let cancel = self.session_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = api.mark_as_read(channel_id, message_id) => {
                    if let Err(e) = result {
                        warn!("mark as read in channel {} failed: {}", channel_id, e);
                    }
                }
            }
        });
    }
}
