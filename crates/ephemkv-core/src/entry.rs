use serde::{Deserialize, Serialize};

/// A stored payload with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: String,

    /// Epoch milliseconds after which the sweeper may remove the entry
    pub expires_at_ms: i64,
}

impl Entry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms < now_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
