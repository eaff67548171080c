//! `toolq-agent` library crate.
//!
//! The reference worker: registers with the server, claims queued jobs,
//! runs them and reports back. Also carries the real-time channel client
//! with its reconnect/backoff state machine.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod runner;
