//! Row operations on the `data` table.
//!
//! Every function takes an [`Executor`], so the store and the transactional
//! view share one implementation.

use crate::executor::Executor;
use ephemkv_core::{
    error::{EphemkvError, Result},
    generate_key, observe, Entry,
};
use rusqlite::params;

/// Insert `value` under a freshly generated key expiring `ttl_ms` after `now_ms`.
///
/// Insert failures, a primary-key collision included, come back unchanged.
pub fn insert_with_generated_key<E: Executor + ?Sized>(
    exec: &E,
    value: &str,
    now_ms: i64,
    ttl_ms: i64,
    key_bytes: usize,
) -> Result<String> {
    let key = generate_key(key_bytes)?;
    let delete_at = now_ms.saturating_add(ttl_ms);

    exec.exec(
        "INSERT INTO data (key, value, delete_at) VALUES (?1, ?2, ?3)",
        params![key, value, delete_at],
    )?;
    observe::record_put();

    Ok(key)
}

/// Value stored under `key`, if the entry exists and has not expired
pub fn lookup<E: Executor + ?Sized>(exec: &E, key: &str, now_ms: i64) -> Result<Option<String>> {
    exec.query_row(
        "SELECT value FROM data WHERE key = ?1 AND delete_at >= ?2",
        params![key, now_ms],
        |row| row.get(0),
    )
}

/// Full entry for `key`, expired or not
pub fn lookup_entry<E: Executor + ?Sized>(exec: &E, key: &str) -> Result<Option<Entry>> {
    exec.query_row(
        "SELECT key, value, delete_at FROM data WHERE key = ?1",
        params![key],
        |row| {
            Ok(Entry {
                key: row.get(0)?,
                value: row.get(1)?,
                expires_at_ms: row.get(2)?,
            })
        },
    )
}

/// Delete `key`.
///
/// `Ok(false)` when nothing matched. More than one deleted row means the
/// primary key no longer holds and is reported as an integrity error.
pub fn remove<E: Executor + ?Sized>(exec: &E, key: &str) -> Result<bool> {
    let deleted = exec.exec("DELETE FROM data WHERE key = ?1", params![key])?;

    let affected = match deleted {
        0 => false,
        1 => true,
        n => {
            tracing::error!("Delete of a single key removed {} rows", n);
            return Err(EphemkvError::Integrity(format!(
                "expected to delete at most 1 row, deleted {}",
                n
            )));
        }
    };
    observe::record_delete(affected);

    Ok(affected)
}

/// Keys of every entry that has not expired
pub fn list_keys<E: Executor + ?Sized>(exec: &E, now_ms: i64) -> Result<Vec<String>> {
    exec.query_all(
        "SELECT key FROM data WHERE delete_at >= ?1",
        params![now_ms],
        |row| row.get(0),
    )
}

/// Number of entries that have not expired
pub fn count_live<E: Executor + ?Sized>(exec: &E, now_ms: i64) -> Result<usize> {
    let count: Option<i64> = exec.query_row(
        "SELECT COUNT(*) FROM data WHERE delete_at >= ?1",
        params![now_ms],
        |row| row.get(0),
    )?;
    Ok(count.unwrap_or(0) as usize)
}

/// Delete every entry whose expiry is before `now_ms`
pub fn sweep_expired<E: Executor + ?Sized>(exec: &E, now_ms: i64) -> Result<usize> {
    exec.exec("DELETE FROM data WHERE delete_at < ?1", params![now_ms])
}
