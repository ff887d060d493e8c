//! Optional metrics instrumentation for ephemkv.
//!
//! When the `observe` feature is enabled, store operations and sweep passes
//! emit counters and histograms via the [`metrics`] crate. The embedding
//! application installs the recorder.
//!
//! Without the feature every function here is a no-op.

/// Record a generated key.
///
/// - `ephemkv.put_total` – counter
#[inline]
pub fn record_put() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ephemkv.put_total").increment(1);
    }
}

/// Record an explicit delete.
///
/// - `ephemkv.delete_total` – counter with `result` label (`hit` / `miss`)
#[inline]
pub fn record_delete(affected: bool) {
    #[cfg(feature = "observe")]
    {
        let result = if affected { "hit" } else { "miss" };
        metrics::counter!("ephemkv.delete_total", "result" => result).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = affected;
    }
}

/// Record a completed sweep pass.
///
/// - `ephemkv.sweep.deleted_total` – counter
/// - `ephemkv.sweep.duration_seconds` – histogram
#[inline]
pub fn record_sweep(duration: std::time::Duration, deleted: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ephemkv.sweep.deleted_total").increment(deleted);
        metrics::histogram!("ephemkv.sweep.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, deleted);
    }
}

/// Record a failed sweep pass.
///
/// - `ephemkv.sweep.errors_total` – counter
#[inline]
pub fn record_sweep_error() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ephemkv.sweep.errors_total").increment(1);
    }
}
