//! seedql drives a relational database into a known state from a declarative
//! YAML dataset (*seed*) and later compares the database against a declarative
//! expectation (*assert*), producing a structured diff.
//!
//! ```no_run
//! use seedql::{assert_dataset, open_driver, parse_dataset_str, seed};
//! use seedql::{AssertOptions, CancelToken, SeedOptions};
//!
//! # fn main() -> seedql::Result<()> {
//! let token = CancelToken::new();
//! let mut driver = open_driver(&token, "sqlite://test.db")?;
//!
//! let dataset = parse_dataset_str("user:\n- { id: 1, name: Frank }\n")?;
//! seed(&token, driver.as_mut(), &dataset, SeedOptions::default())?;
//!
//! let (ok, _results) =
//!     assert_dataset(&token, driver.as_ref(), &dataset, AssertOptions::default())?;
//! assert!(ok);
//! # Ok(())
//! # }
//! ```

pub use seedql_core::{
    assert_dataset, parse_dataset, parse_dataset_str, seed, tag_filter, AssertOptions,
    AssertProgress, AssertStatus, CancelToken, DataSet, DatasetError, DbDriver, DiffSink,
    DriverError, Error, Field, FieldDiff, MatchStrategy, MissingPrimaryKey, NormalizedTable,
    Operation, ParseError, Placeholder, Result, Row, RowDiff, SeedOptions, SeedProgress, SeedTask,
    SourceLocation, Table, TableAssertion, Transaction, Value, DEFAULT_BATCH_SIZE, MATCH_KEY,
    OPERATION_KEY, TAG_KEY,
};

const MYSQL_SCHEME: &str = "mysql://";
const POSTGRES_SCHEME: &str = "postgres://";
const SQLITE_SCHEME: &str = "sqlite://";
const SQLITE3_SCHEME: &str = "sqlite3://";

/// Opens a driver for the connection string, dispatching on the scheme
/// prefix: `postgres://`, `mysql://`, or `sqlite://` (alias `sqlite3://`).
///
/// PostgreSQL and MySQL URLs are handed to the native drivers whole; for
/// SQLite the scheme is stripped and the remainder opened as a path or
/// `file:` URI. The token is shared with the driver, which refuses further
/// statements once it is signalled.
pub fn open_driver(token: &CancelToken, conn: &str) -> Result<Box<dyn DbDriver>> {
    if conn.starts_with(MYSQL_SCHEME) {
        #[cfg(feature = "mysql")]
        return seedql_dialect_mysql::connect(conn, token.clone());
        #[cfg(not(feature = "mysql"))]
        return Err(DriverError::DisabledDialect { dialect: "mysql" }.into());
    }
    if let Some(dsn) = strip_sqlite_scheme(conn) {
        #[cfg(feature = "sqlite")]
        return seedql_dialect_sqlite::connect(dsn, token.clone());
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = dsn;
            return Err(DriverError::DisabledDialect { dialect: "sqlite" }.into());
        }
    }
    if conn.starts_with(POSTGRES_SCHEME) {
        #[cfg(feature = "postgres")]
        return seedql_dialect_postgres::connect(conn, token.clone());
        #[cfg(not(feature = "postgres"))]
        return Err(DriverError::DisabledDialect { dialect: "postgres" }.into());
    }

    Err(DriverError::InvalidScheme {
        conn: conn.to_string(),
    }
    .into())
}

fn strip_sqlite_scheme(conn: &str) -> Option<&str> {
    conn.strip_prefix(SQLITE_SCHEME)
        .or_else(|| conn.strip_prefix(SQLITE3_SCHEME))
}
