//! Point-in-time readers for mining-pool worker state kept in a
//! Redis-protocol key-value store.
//!
//! `snapshot` holds the two read operations: a pattern scan over
//! `eth:miners:*`-style hash keys and a fetch of one named hash. They run
//! against any [`HashStore`]; [`Client`] is the network implementation.
//! `server` is a small in-memory store used for local runs and tests.

pub mod client;
pub mod config;
pub mod connection;
pub mod frame;
pub mod glob;
pub mod logging;
pub mod poll;
pub mod server;
pub mod snapshot;

mod error;

pub use client::Client;
pub use config::ConnectionConfig;
pub use error::{Result, SnapshotError};
pub use snapshot::{HashFields, HashStore};
