use crate::error::{EphemkvError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest TTL a store accepts.
///
/// The sweep cadence is derived from the TTL, so anything shorter would have
/// the sweeper hammering the single connection.
pub const MIN_TTL: Duration = Duration::from_secs(1);

/// Shortest interval between two sweep passes.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound for the derived sweep interval when none is configured.
pub const MAX_DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Random bytes drawn per key by default (256 bits).
pub const DEFAULT_KEY_BYTES: usize = 32;

/// Fewest random bytes a key may carry (128 bits).
pub const MIN_KEY_BYTES: usize = 16;

/// Configuration for an ephemeral store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Lifetime of every entry, in milliseconds
    pub ttl_ms: u64,

    /// Interval between sweep passes, in milliseconds.
    /// Default: half the TTL, clamped to [500ms, 60s]
    #[serde(default)]
    pub sweep_interval_ms: Option<u64>,

    /// Random bytes drawn per generated key
    /// Default: 32
    #[serde(default = "default_key_bytes")]
    pub key_bytes: usize,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// Parent directory for the private backing directory.
    /// Default: the system temp directory
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Sweeper errors buffered before new ones are dropped
    /// Default: 16
    #[serde(default = "default_sweep_error_capacity")]
    pub sweep_error_capacity: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    Full,
    /// fsync at critical moments (good balance)
    #[default]
    Normal,
    /// No fsync (fastest, least safe)
    Off,
}

impl SynchronousMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn default_key_bytes() -> usize {
    DEFAULT_KEY_BYTES
}

fn default_sweep_error_capacity() -> usize {
    16
}

impl StoreConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: duration_to_ms(ttl),
            sweep_interval_ms: None,
            key_bytes: default_key_bytes(),
            synchronous: SynchronousMode::default(),
            temp_dir: None,
            sweep_error_capacity: default_sweep_error_capacity(),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = Some(duration_to_ms(interval));
        self
    }

    pub fn with_key_bytes(mut self, key_bytes: usize) -> Self {
        self.key_bytes = key_bytes;
        self
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Place the private backing directory under `dir` instead of the
    /// system temp directory
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn with_sweep_error_capacity(mut self, capacity: usize) -> Self {
        self.sweep_error_capacity = capacity;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Effective sweep cadence.
    ///
    /// Sweeping at half the TTL keeps the expired-but-unswept window under
    /// half a lifetime while the 60s ceiling bounds it for long TTLs.
    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => (self.ttl() / 2).clamp(MIN_SWEEP_INTERVAL, MAX_DEFAULT_SWEEP_INTERVAL),
        }
    }

    /// Check the configuration before any resource is created
    pub fn validate(&self) -> Result<()> {
        if self.ttl() < MIN_TTL {
            return Err(EphemkvError::Config(format!(
                "ttl of {}ms is below the minimum of {}ms",
                self.ttl_ms,
                MIN_TTL.as_millis()
            )));
        }

        if i64::try_from(self.ttl_ms).is_err() {
            return Err(EphemkvError::Config(format!(
                "ttl of {}ms does not fit an epoch-millisecond timestamp",
                self.ttl_ms
            )));
        }

        if self.sweep_interval() < MIN_SWEEP_INTERVAL {
            return Err(EphemkvError::Config(format!(
                "sweep interval of {}ms is below the minimum of {}ms",
                self.sweep_interval().as_millis(),
                MIN_SWEEP_INTERVAL.as_millis()
            )));
        }

        if self.key_bytes < MIN_KEY_BYTES {
            return Err(EphemkvError::Config(format!(
                "keys of {} bytes carry less than {} bits of entropy",
                self.key_bytes,
                MIN_KEY_BYTES * 8
            )));
        }

        if self.sweep_error_capacity == 0 {
            return Err(EphemkvError::Config(
                "sweep error capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
