use ephemkv_core::{
    error::{EphemkvError, Result},
    StoreConfig,
};
use rusqlite::Connection;

/// Apply connection pragmas.
///
/// WAL is mandatory: the store refuses to open if SQLite reports any other
/// journal mode after the switch.
pub fn configure_connection(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(EphemkvError::Config(format!(
            "could not enable WAL journaling, SQLite reports journal_mode={}",
            mode
        )));
    }

    conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())?;

    // Caller tables sharing the connection get enforced references
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(())
}

/// Create the entry table if it does not exist yet
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS data (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            delete_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS data_delete_at ON data(delete_at);",
    )?;

    Ok(())
}
