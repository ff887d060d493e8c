//! SQLite-backed ephemeral key/value store
//!
//! Issues random opaque keys for short-lived payloads and deletes them once
//! their TTL has passed.
//!
//! Key features:
//! - One private WAL-mode database file per store, removed on close
//! - A single connection serializing every reader, writer and the sweeper
//! - Background expiry sweeper with an asynchronous error channel
//! - Transactional view for grouping several operations into one unit of work

pub mod executor;
pub mod rows;
pub mod schema;
pub mod store;
pub mod sweeper;
pub mod txn;

pub use executor::Executor;
pub use store::SqliteEphemeralStore;
pub use sweeper::SweepErrors;
pub use txn::TxnView;

pub use ephemkv_core::{EphemeralOps, EphemkvError, Entry, Result, StoreConfig, SynchronousMode};
