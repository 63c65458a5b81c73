use std::{
    collections::BTreeMap,
    error::Error as StdError,
    io,
    sync::{Mutex, MutexGuard},
};

use rusqlite::{
    types::{ToSqlOutput, Value as SqlValue, ValueRef},
    Connection, OpenFlags, ToSql,
};
use seedql_core::{CancelToken, DbDriver, DriverError, Result, Transaction, Value};

use crate::{queries, statements};

const BEGIN_SQL: &str = "BEGIN";
const DIALECT_NAME: &str = "sqlite";
const POISONED_CONNECTION_MESSAGE: &str = "sqlite connection state was poisoned";

pub(crate) struct SqliteDriver {
    connection: Mutex<Connection>,
    token: CancelToken,
}

/// Opens the SQLite database at `dsn` (a path or a `file:` URI, the scheme
/// prefix already stripped). The token is checked before every statement.
pub fn connect(dsn: &str, token: CancelToken) -> Result<Box<dyn DbDriver>> {
    let flags = OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI;
    let connection = Connection::open_with_flags(dsn, flags)
        .map_err(|source| DriverError::connect(DIALECT_NAME, source))?;

    Ok(Box::new(SqliteDriver {
        connection: Mutex::new(connection),
        token,
    }))
}

impl SqliteDriver {
    fn lock_connection(&self, sql: &str) -> Result<MutexGuard<'_, Connection>> {
        self.token.ensure_active()?;
        self.connection
            .lock()
            .map_err(|_| statement_error(sql, io::Error::other(POISONED_CONNECTION_MESSAGE)))
    }

    fn run_with_params(&self, sql: &str, values: &[Value]) -> Result<()> {
        let connection = self.lock_connection(sql)?;
        let mut statement = connection
            .prepare(sql)
            .map_err(|source| statement_error(sql, source))?;
        statement
            .execute(rusqlite::params_from_iter(values.iter().map(SqliteValue)))
            .map_err(|source| statement_error(sql, source))?;
        Ok(())
    }
}

impl DbDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        DIALECT_NAME
    }

    // SQLite has a single schema per file; the parameter is ignored.
    fn table_names(&self, _schema: Option<&str>) -> Result<Vec<String>> {
        let connection = self.lock_connection(queries::TABLE_NAMES_QUERY)?;
        query_string_rows(&connection, queries::TABLE_NAMES_QUERY, &[])
    }

    fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let connection = self.lock_connection(queries::PRIMARY_KEYS_QUERY)?;
        query_string_rows(&connection, queries::PRIMARY_KEYS_QUERY, &[&table as &dyn ToSql])
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let connection = self.lock_connection(sql)?;
        connection
            .execute_batch(sql)
            .map_err(|source| statement_error(sql, source))
    }

    fn insert(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        let sql = statements::insert_sql(table, columns, values.len() / columns.len());
        self.run_with_params(&sql, values)
    }

    fn upsert(
        &self,
        table: &str,
        columns: &[String],
        primary_keys: &[String],
        values: &[Value],
    ) -> Result<()> {
        let sql =
            statements::upsert_sql(table, columns, primary_keys, values.len() / columns.len());
        self.run_with_params(&sql, values)
    }

    fn delete(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        let sql = statements::delete_sql(table, columns, values.len() / columns.len());
        self.run_with_params(&sql, values)
    }

    fn truncate(&self, table: &str) -> Result<()> {
        self.execute(&statements::truncate_sql(table))
    }

    fn fetch_rows(&self, table: &str) -> Result<Vec<BTreeMap<String, Value>>> {
        let sql = format!("SELECT * FROM {table}");
        let connection = self.lock_connection(&sql)?;
        let mut statement = connection
            .prepare(&sql)
            .map_err(|source| statement_error(&sql, source))?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = statement
            .query([])
            .map_err(|source| statement_error(&sql, source))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(|source| statement_error(&sql, source))? {
            self.token.ensure_active()?;
            let mut decoded = BTreeMap::new();
            for (index, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(index)
                    .map_err(|source| statement_error(&sql, source))?;
                decoded.insert(column.clone(), decode_value(value));
            }
            result.push(decoded);
        }

        Ok(result)
    }

    fn begin(&mut self) -> Result<Transaction<'_>> {
        self.execute(BEGIN_SQL)?;
        Ok(Transaction::new(self))
    }
}

struct SqliteValue<'a>(&'a Value);

impl ToSql for SqliteValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(value) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*value))),
            Value::Int(value) => ToSqlOutput::Owned(SqlValue::Integer(*value)),
            Value::Float(value) => ToSqlOutput::Owned(SqlValue::Real(*value)),
            Value::Str(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Value::Placeholder(placeholder) => {
                ToSqlOutput::Owned(SqlValue::Text(placeholder.token().to_string()))
            }
        })
    }
}

fn decode_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Int(value),
        ValueRef::Real(value) => Value::Float(value),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Str(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn query_string_rows(
    connection: &Connection,
    query: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<String>> {
    let mut statement = connection
        .prepare(query)
        .map_err(|source| statement_error(query, source))?;
    let mut rows = statement
        .query(params)
        .map_err(|source| statement_error(query, source))?;

    let mut values = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|source| statement_error(query, source))?
    {
        values.push(
            row.get::<_, String>(0)
                .map_err(|source| statement_error(query, source))?,
        );
    }

    Ok(values)
}

fn statement_error<E>(sql: &str, source: E) -> seedql_core::Error
where
    E: StdError + Send + Sync + 'static,
{
    DriverError::statement(sql, source).into()
}
