//! Real-time status channels.
//!
//! Provides connection management, the heartbeat/idle sweep, the HTTP
//! upgrade handlers used by Axum routes, and the broadcaster that fans
//! queue events out to subscribed connections.

mod broadcaster;
mod handler;
mod heartbeat;
pub mod manager;

pub use broadcaster::ChannelBroadcaster;
pub use handler::{ws_global_handler, ws_job_handler};
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
