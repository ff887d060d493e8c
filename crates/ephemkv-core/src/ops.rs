use crate::error::Result;

/// Operations shared by a store and a transaction-bound view of it.
///
/// Code written against this trait runs unchanged inside or outside an
/// enclosing transaction.
pub trait EphemeralOps {
    /// Store `value` under a freshly generated key and return the key
    fn put(&self, value: &str) -> Result<String>;

    /// Look up a live value; `None` when the key is unknown or expired
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key; `false` when nothing matched
    fn delete(&self, key: &str) -> Result<bool>;

    /// Read a value and remove it, so a key is consumed at most once.
    ///
    /// When two callers race, only the one whose delete hits the row gets
    /// the value back.
    fn take(&self, key: &str) -> Result<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() && !self.delete(key)? {
            return Ok(None);
        }
        Ok(value)
    }
}
