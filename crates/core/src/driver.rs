use std::collections::BTreeMap;

use crate::{Result, Value};

const COMMIT_SQL: &str = "COMMIT";
const ROLLBACK_SQL: &str = "ROLLBACK";

/// A single database connection used by the seed and assert engines.
///
/// Implementations must keep all methods on the same physical connection so
/// that statements issued between `begin` and commit stay inside one
/// transaction. The trait intentionally exposes synchronous I/O only; async
/// boundaries must stay inside driver implementations and not leak into core
/// APIs.
///
/// `values` parameters are flat: `values.len() / columns.len()` rows, column
/// order matching `columns`. Values travel as statement parameters, so no
/// quoting rules apply here.
pub trait DbDriver: Send {
    fn name(&self) -> &'static str;

    /// Base-table names in the given schema (current schema when `None`),
    /// lexicographically sorted.
    fn table_names(&self, schema: Option<&str>) -> Result<Vec<String>>;

    /// Primary-key column names of `table`, lexicographically sorted.
    /// `table` may be qualified as `schema.table`.
    fn primary_keys(&self, table: &str) -> Result<Vec<String>>;

    fn execute(&self, sql: &str) -> Result<()>;

    fn insert(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()>;

    fn upsert(
        &self,
        table: &str,
        columns: &[String],
        primary_keys: &[String],
        values: &[Value],
    ) -> Result<()>;

    /// Deletes the rows whose primary-key tuples appear in `values`.
    fn delete(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()>;

    fn truncate(&self, table: &str) -> Result<()>;

    /// Unconstrained `SELECT *`, decoded column-wise: raw bytes become
    /// strings, 64-bit integers the canonical integer kind, null stays null.
    fn fetch_rows(&self, table: &str) -> Result<Vec<BTreeMap<String, Value>>>;

    fn begin(&mut self) -> Result<Transaction<'_>>;
}

/// RAII transaction handle.
///
/// If dropped without calling `commit`, it triggers `ROLLBACK` on the same
/// driver connection. The data-phase calls are forwarded here so that every
/// write issued by the seed engine visibly runs inside the transaction scope.
pub struct Transaction<'a> {
    driver: &'a mut dyn DbDriver,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(driver: &'a mut dyn DbDriver) -> Self {
        Self {
            driver,
            committed: false,
        }
    }

    pub fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        self.driver.primary_keys(table)
    }

    pub fn insert(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        self.driver.insert(table, columns, values)
    }

    pub fn upsert(
        &mut self,
        table: &str,
        columns: &[String],
        primary_keys: &[String],
        values: &[Value],
    ) -> Result<()> {
        self.driver.upsert(table, columns, primary_keys, values)
    }

    pub fn delete(&mut self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        self.driver.delete(table, columns, values)
    }

    pub fn truncate(&mut self, table: &str) -> Result<()> {
        self.driver.truncate(table)
    }

    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.driver.execute(sql)
    }

    pub fn commit(mut self) -> Result<()> {
        self.driver.execute(COMMIT_SQL)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.driver.execute(ROLLBACK_SQL);
        }
    }
}
