use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_types::events::ChatAction;

use crate::api::ChatApi;
use crate::dispatcher::Dispatcher;
use crate::store::StoreStatus;

/// Poll the server for updates newer than the store's watermark and hand
/// them to the store through the dispatcher. Failed polls are logged and
/// retried on the next tick. Polling holds off while the store is signed
/// out. Returns once `cancel` fires or the store is gone.
pub async fn run_sync_loop(
    api: Arc<dyn ChatApi>,
    dispatcher: Dispatcher,
    mut status: watch::Receiver<StoreStatus>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("sync loop started (every {:?})", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !status.borrow().signed_in {
            debug!("sync paused while signed out");
            let resumed = tokio::select! {
                _ = cancel.cancelled() => break,
                resumed = status.wait_for(|s| s.signed_in) => resumed.is_ok(),
            };
            if !resumed {
                break;
            }
        }

        let (since, session) = {
            let current = status.borrow();
            (current.max_message_id, current.session)
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.get_updates(since) => result,
        };

        match result {
            Ok(updates) => {
                debug!(
                    "sync since {}: {} channels, {} messages, {} silences",
                    since,
                    updates.presence.len(),
                    updates.messages.len(),
                    updates.silences.len()
                );
                dispatcher.dispatch(ChatAction::UpdatesReceived { updates, session });
            }
            Err(e) => warn!("sync since {} failed: {}", since, e),
        }
    }

    info!("sync loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parley_types::api::{GetUpdatesJson, MessageJson, NewConversationJson};
    use parley_types::models::Message;
    use parley_types::{ChannelId, MessageId, UserId};

    use crate::api::ApiError;

    #[derive(Default)]
    struct CountingApi {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl ChatApi for CountingApi {
        async fn send_message(&self, _message: &Message) -> Result<MessageJson, ApiError> {
            Err(ApiError::Status { status: 500, body: "unused".into() })
        }

        async fn new_conversation(
            &self,
            _user_id: UserId,
            _message: &Message,
        ) -> Result<NewConversationJson, ApiError> {
            Err(ApiError::Status { status: 500, body: "unused".into() })
        }

        async fn get_updates(&self, _since: MessageId) -> Result<GetUpdatesJson, ApiError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(GetUpdatesJson::default())
        }

        async fn mark_as_read(&self, _channel_id: ChannelId, _message_id: MessageId) -> Result<(), ApiError> {
            Ok(())
        }

        async fn part_channel(&self, _channel_id: ChannelId) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn status(session: u64, signed_in: bool) -> StoreStatus {
        StoreStatus { version: 1, max_message_id: 7, loaded: true, session, signed_in }
    }

    #[tokio::test]
    async fn test_poll_carries_session() {
        let api = Arc::new(CountingApi::default());
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let (_tx, status_rx) = watch::channel(status(3, true));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_sync_loop(
            api.clone(),
            dispatcher,
            status_rx,
            Duration::from_millis(10),
            cancel.clone(),
        ));
        let action = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no poll")
            .unwrap();
        cancel.cancel();
        task.await.unwrap();

        assert!(matches!(action, ChatAction::UpdatesReceived { session: 3, .. }));
    }

    #[tokio::test]
    async fn test_no_polls_while_signed_out() {
        let api = Arc::new(CountingApi::default());
        let (tx, status_rx) = watch::channel(status(1, false));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_sync_loop(
            api.clone(),
            Dispatcher::new(),
            status_rx,
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(api.polls.load(Ordering::SeqCst), 0);

        tx.send_replace(status(2, true));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(api.polls.load(Ordering::SeqCst) > 0);
    }
}
