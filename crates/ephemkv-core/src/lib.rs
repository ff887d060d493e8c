//! ephemkv core: types and configuration for the ephemeral key/value store
//!
//! This crate holds the backend-independent pieces:
//! - Error taxonomy shared by every backend
//! - Store configuration with serde defaults
//! - Cryptographically random opaque key generation
//! - The `EphemeralOps` capability shared by stores and transactional views
//! - Optional metrics behind the `observe` feature

pub mod config;
pub mod entry;
pub mod error;
pub mod keygen;
pub mod observe;
pub mod ops;

pub use config::{
    StoreConfig, SynchronousMode, DEFAULT_KEY_BYTES, MIN_KEY_BYTES, MIN_SWEEP_INTERVAL, MIN_TTL,
};
pub use entry::{now_ms, Entry};
pub use error::{EphemkvError, Result};
pub use keygen::generate_key;
pub use ops::EphemeralOps;
