mod commands;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_store::{ChannelStore, ChatApi, ClientConfig, Dispatcher, HttpChatApi, run_sync_loop};
use parley_types::UserId;

use crate::commands::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_store=debug".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    info!("connecting to {} as user {}", config.api_url, config.user_id);

    let api: Arc<dyn ChatApi> =
        Arc::new(HttpChatApi::new(&config.api_url, config.token.clone(), config.user_id));
    let dispatcher = Dispatcher::new();
    // subscribe before anything can dispatch
    let actions = dispatcher.subscribe();
    let mut store = ChannelStore::new(dispatcher.clone(), api.clone());

    let shutdown = CancellationToken::new();

    let sync_task = tokio::spawn(run_sync_loop(
        api,
        dispatcher.clone(),
        store.subscribe_changes(),
        config.poll_interval,
        shutdown.clone(),
    ));

    tokio::spawn(read_commands(dispatcher, config.user_id, shutdown.clone()));

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    store.run(actions, shutdown.clone(), render).await;

    shutdown.cancel();
    let _ = sync_task.await;
    info!("bye");

    Ok(())
}

/// Turn stdin lines into dispatched actions until `quit` or EOF.
async fn read_commands(dispatcher: Dispatcher, user_id: UserId, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        };

        match Command::parse(&line) {
            Ok(command) => match command.into_action(user_id) {
                Some(action) => dispatcher.dispatch(action),
                None => break,
            },
            Err(e) => warn!("{}", e),
        }
    }

    shutdown.cancel();
}

fn render(store: &ChannelStore) {
    for channel in store.channel_list() {
        let marker = if channel.new_pm_channel {
            "+"
        } else if channel.is_unread() {
            "*"
        } else {
            " "
        };
        let pending = channel.messages().iter().filter(|m| m.pending).count();
        let failed = channel.messages().iter().filter(|m| m.errored).count();
        info!(
            "{} [{}] {} ({} messages, {} pending, {} failed)",
            marker,
            channel.channel_id,
            channel.name,
            channel.messages().len(),
            pending,
            failed
        );
    }
}
