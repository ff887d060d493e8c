use crate::rows;
use ephemkv_core::{error::Result, now_ms, EphemeralOps, StoreConfig};
use rusqlite::Transaction;

/// Store-shaped view over one open transaction.
///
/// Handed to the callback of
/// [`SqliteEphemeralStore::in_transaction`](crate::SqliteEphemeralStore::in_transaction)
/// and valid only for that call. Everything done through it commits or rolls
/// back together with whatever the callback runs on [`TxnView::executor`].
pub struct TxnView<'a> {
    txn: &'a Transaction<'a>,
    config: &'a StoreConfig,
}

impl<'a> TxnView<'a> {
    pub(crate) fn new(txn: &'a Transaction<'a>, config: &'a StoreConfig) -> Self {
        Self { txn, config }
    }

    pub fn put(&self, value: &str) -> Result<String> {
        rows::insert_with_generated_key(
            self.txn,
            value,
            now_ms(),
            self.config.ttl_ms as i64,
            self.config.key_bytes,
        )
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        rows::lookup(self.txn, key, now_ms())
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        rows::remove(self.txn, key)
    }

    /// The underlying transaction, for statements of the caller's own that
    /// must share this unit of work
    pub fn executor(&self) -> &Transaction<'a> {
        self.txn
    }
}

impl EphemeralOps for TxnView<'_> {
    fn put(&self, value: &str) -> Result<String> {
        TxnView::put(self, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        TxnView::get(self, key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        TxnView::delete(self, key)
    }
}
