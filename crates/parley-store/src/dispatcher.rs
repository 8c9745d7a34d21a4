use tokio::sync::broadcast;
use tracing::trace;

use parley_types::events::ChatAction;

const DEFAULT_CAPACITY: usize = 1024;

/// Action bus shared by the store, the sync worker and the UI.
///
/// Every subscriber sees every action. Dispatching while nobody listens is
/// not an error; the action is simply dropped.
#[derive(Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<ChatAction>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to dispatched actions. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatAction> {
        self.tx.subscribe()
    }

    pub fn dispatch(&self, action: ChatAction) {
        trace!("dispatch {}", action.tag());
        let _ = self.tx.send(action);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_without_subscribers() {
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch(ChatAction::UserLogout);
    }

    #[test]
    fn test_every_subscriber_receives() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.clone().subscribe();

        dispatcher.dispatch(ChatAction::ChannelSwitch { channel_id: 4 });

        assert!(matches!(a.try_recv(), Ok(ChatAction::ChannelSwitch { channel_id: 4 })));
        assert!(matches!(b.try_recv(), Ok(ChatAction::ChannelSwitch { channel_id: 4 })));
        assert!(a.try_recv().is_err());
    }
}
