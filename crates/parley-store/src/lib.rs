/// Client-side chat state: channels, their message history and the action
/// switchboard that keeps them in step with the server.
///
/// - `ChannelStore` owns every channel and reacts to dispatched actions
/// - `Dispatcher` is the action bus injected into the store
/// - `ChatApi` is the transport seam, with `HttpChatApi` over REST
/// - `run_sync_loop` polls for incremental updates

pub mod api;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod store;
pub mod sync;
pub mod users;

pub use api::{ApiError, ChatApi, HttpChatApi};
pub use channel::Channel;
pub use config::{ClientConfig, ConfigError};
pub use dispatcher::Dispatcher;
pub use store::{ChannelStore, StoreStatus};
pub use sync::run_sync_loop;
pub use users::UserStore;
