use crate::rows;
use crate::schema;
use crate::sweeper::{self, SweepErrors, Sweeper};
use crate::txn::TxnView;
use ephemkv_core::{
    error::{EphemkvError, Result},
    now_ms, EphemeralOps, Entry, StoreConfig,
};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DB_FILE_NAME: &str = "ephemkv.db";

/// SQLite-backed ephemeral key/value store
///
/// Owns a private database file in a fresh temporary directory and exactly
/// one connection to it. That connection is the only serialization point:
/// foreground calls and the background sweeper queue on it in turn.
///
/// All operations are synchronous. The sweeper is a tokio task, so the store
/// must be initialized from within a tokio runtime.
///
/// # Example
///
/// ```ignore
/// let (store, mut sweep_errors) = SqliteEphemeralStore::initialize(Duration::from_secs(900))?;
///
/// let key = store.put("user@example.com;https://app.example/callback")?;
/// assert!(store.get(&key)?.is_some());
///
/// store.in_transaction(|view| {
///     let payload = view.get(&key)?;
///     view.delete(&key)?;
///     Ok(payload)
/// })?;
///
/// store.close()?;
/// ```
#[derive(Debug)]
pub struct SqliteEphemeralStore {
    conn: Arc<Mutex<Option<Connection>>>,
    config: StoreConfig,
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    /// Thread currently running an `in_transaction` callback
    txn_owner: Mutex<Option<ThreadId>>,
}

impl SqliteEphemeralStore {
    /// Open a store whose entries live for `ttl`
    pub fn initialize(ttl: Duration) -> Result<(Self, SweepErrors)> {
        Self::initialize_with_config(StoreConfig::new(ttl))
    }

    pub fn initialize_with_config(config: StoreConfig) -> Result<(Self, SweepErrors)> {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EphemkvError::Config(
                "SqliteEphemeralStore needs a tokio runtime for its sweeper; \
                 initialize it from within #[tokio::main] or #[tokio::test]"
                    .into(),
            )
        })?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("ephemkv-");
        let dir = match &config.temp_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().join(DB_FILE_NAME);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        schema::configure_connection(&conn, &config)?;
        schema::init_schema(&conn)?;

        let conn = Arc::new(Mutex::new(Some(conn)));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (errors_tx, errors_rx) = mpsc::channel(config.sweep_error_capacity);

        let handle = Sweeper::new(Arc::clone(&conn), config.sweep_interval(), errors_tx)
            .spawn(&runtime, shutdown_rx);

        info!(
            "Ephemeral store opened at {}, ttl {:?}, sweep interval {:?}",
            path.display(),
            config.ttl(),
            config.sweep_interval()
        );

        let store = Self {
            conn,
            config,
            path,
            dir: Mutex::new(Some(dir)),
            shutdown,
            sweeper: Mutex::new(Some(handle)),
            txn_owner: Mutex::new(None),
        };

        Ok((store, errors_rx))
    }

    /// Refuse calls from a transaction callback running on this thread,
    /// which would otherwise deadlock on the connection mutex.
    fn check_reentry(&self) -> Result<()> {
        if *self.txn_owner.lock() == Some(thread::current().id()) {
            return Err(EphemkvError::Reentrant);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.check_reentry()?;
        Ok(self.conn.lock())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(EphemkvError::Closed)?;
        f(conn)
    }

    /// Store `value` under a new random key and return the key
    pub fn put(&self, value: &str) -> Result<String> {
        self.with_conn(|conn| {
            rows::insert_with_generated_key(
                &*conn,
                value,
                now_ms(),
                self.config.ttl_ms as i64,
                self.config.key_bytes,
            )
        })
    }

    /// Value under `key`; `None` if unknown or past its expiry
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| rows::lookup(&*conn, key, now_ms()))
    }

    /// Remove `key`; `false` if nothing matched
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| rows::remove(&*conn, key))
    }

    /// Every live key, in no particular order
    pub fn get_all_keys(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| rows::list_keys(&*conn, now_ms()))
    }

    /// Number of live entries
    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| rows::count_live(&*conn, now_ms()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Stored entry for `key` including its expiry, even if already expired
    pub fn get_entry(&self, key: &str) -> Result<Option<Entry>> {
        self.with_conn(|conn| rows::lookup_entry(&*conn, key))
    }

    /// Run one sweep pass now and return how many entries it removed
    pub fn sweep_now(&self) -> Result<usize> {
        self.with_conn(sweeper::sweep_pass)
    }

    /// Run `f` inside one transaction on the store's connection.
    ///
    /// If `f` returns `Ok`, the transaction commits and a commit failure is
    /// returned. If `f` returns `Err`, the transaction rolls back and the
    /// error comes back, joined with the rollback failure if there was one.
    /// Exactly one of commit or rollback is attempted. A failed commit leaves
    /// nothing applied: the still-open transaction is rolled back on drop.
    ///
    /// `f` must go through the supplied view: calling back into this store
    /// from inside `f` fails with [`EphemkvError::Reentrant`].
    pub fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxnView<'_>) -> Result<T>,
    {
        let mut guard = self.lock()?;
        let conn = guard.as_mut().ok_or(EphemkvError::Closed)?;
        let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = {
            let _owner = OwnerGuard::enter(&self.txn_owner);
            f(&TxnView::new(&txn, &self.config))
        };

        match outcome {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => match txn.rollback() {
                Ok(()) => Err(err),
                Err(rollback) => {
                    warn!("Rollback failed after callback error: {}", rollback);
                    Err(EphemkvError::Rollback {
                        source: Box::new(err),
                        rollback,
                    })
                }
            },
        }
    }

    /// Stop the sweeper, close the connection and remove the backing files.
    ///
    /// Every step runs even if an earlier one fails; all failures come back
    /// together. Must not race in-flight operations on this store. Closing an
    /// already closed store is a no-op. Called from a transaction callback it
    /// fails with [`EphemkvError::Reentrant`] and leaves the store untouched.
    pub fn close(&self) -> Result<()> {
        self.check_reentry()?;

        let mut errors = Vec::new();

        self.shutdown.send_replace(true);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        match self.lock() {
            Ok(mut guard) => {
                if let Some(conn) = guard.take() {
                    if let Err((_conn, e)) = conn.close() {
                        errors.push(EphemkvError::Database(e));
                    }
                }
            }
            Err(e) => errors.push(e),
        }

        if let Some(dir) = self.dir.lock().take() {
            if let Err(e) = dir.close() {
                errors.push(EphemkvError::Io(e));
            }
        }

        match EphemkvError::join(errors) {
            Some(err) => Err(err),
            None => {
                info!("Ephemeral store at {} closed", self.path.display());
                Ok(())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    /// Whether the background sweeper task is still alive
    pub fn is_sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl EphemeralOps for SqliteEphemeralStore {
    fn put(&self, value: &str) -> Result<String> {
        SqliteEphemeralStore::put(self, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        SqliteEphemeralStore::get(self, key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        SqliteEphemeralStore::delete(self, key)
    }
}

impl Drop for SqliteEphemeralStore {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
        // An in-flight sweep pass may still hold a clone of the Arc; the
        // connection must not outlive the directory dropped after this.
        self.conn.lock().take();
    }
}

/// Marks the current thread as inside a transaction callback until dropped
struct OwnerGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
}

impl<'a> OwnerGuard<'a> {
    fn enter(owner: &'a Mutex<Option<ThreadId>>) -> Self {
        *owner.lock() = Some(thread::current().id());
        Self { owner }
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        *self.owner.lock() = None;
    }
}
