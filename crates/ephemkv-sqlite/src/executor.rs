use ephemkv_core::error::Result;
use rusqlite::{Connection, OptionalExtension, Params, Row, Transaction};

/// Statement execution against either the primary connection or an open
/// transaction.
///
/// Row operations are written once against this trait and behave the same
/// in both contexts.
pub trait Executor {
    /// The connection statements run on
    fn connection(&self) -> &Connection;

    /// Run a query expected to match at most one row.
    ///
    /// Returns `None` when no row matches.
    fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.connection().query_row(sql, params, f).optional()?)
    }

    /// Run a query and collect every row
    fn query_all<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.connection().prepare_cached(sql)?;
        let rows = stmt.query_map(params, f)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }

    /// Run a statement and return the number of rows it changed
    fn exec<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        Ok(self.connection().execute(sql, params)?)
    }
}

impl Executor for Connection {
    fn connection(&self) -> &Connection {
        self
    }
}

impl Executor for Transaction<'_> {
    fn connection(&self) -> &Connection {
        self
    }
}
