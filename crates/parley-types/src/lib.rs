/// Shared chat types: wire JSON payloads, the client-side message model and
/// the action records carried on the dispatch bus.

pub mod api;
pub mod events;
pub mod models;

pub type ChannelId = i64;
pub type MessageId = i64;
pub type UserId = i64;
