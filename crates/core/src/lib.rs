//! Domain types shared by every `toolq` crate.
//!
//! Zero internal dependencies: the job model and its state machine, the
//! pool status derivation, the real-time wire protocol and the reconnect
//! backoff policy all live here so the server and the agent agree on them.

pub mod backoff;
pub mod error;
pub mod job;
pub mod messages;
pub mod pool;
pub mod types;
pub mod worker;
