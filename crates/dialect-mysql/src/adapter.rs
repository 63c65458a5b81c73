use std::{
    collections::BTreeMap,
    error::Error as StdError,
    io,
    sync::{Mutex, MutexGuard},
};

use mysql::{prelude::Queryable, Opts, Pool, PooledConn, Row};
use seedql_core::{CancelToken, DbDriver, DriverError, Result, Transaction, Value};

use crate::{queries, statements};

const BEGIN_SQL: &str = "BEGIN";
const DIALECT_NAME: &str = "mysql";
const POISONED_CONNECTION_MESSAGE: &str = "mysql connection state was poisoned";

pub(crate) struct MysqlDriver {
    connection: Mutex<PooledConn>,
    token: CancelToken,
}

/// Connects using the full `mysql://` URL, which is the native DSN form of
/// the driver. The token is checked before every statement.
pub fn connect(url: &str, token: CancelToken) -> Result<Box<dyn DbDriver>> {
    let opts = Opts::from_url(url).map_err(|source| DriverError::connect(DIALECT_NAME, source))?;
    let pool = Pool::new(opts).map_err(|source| DriverError::connect(DIALECT_NAME, source))?;
    let connection = pool
        .get_conn()
        .map_err(|source| DriverError::connect(DIALECT_NAME, source))?;

    Ok(Box::new(MysqlDriver {
        connection: Mutex::new(connection),
        token,
    }))
}

impl MysqlDriver {
    fn lock_connection(&self, sql: &str) -> Result<MutexGuard<'_, PooledConn>> {
        self.token.ensure_active()?;
        self.connection
            .lock()
            .map_err(|_| statement_error(sql, io::Error::other(POISONED_CONNECTION_MESSAGE)))
    }

    fn run_with_params(&self, sql: &str, values: &[Value]) -> Result<()> {
        let mut connection = self.lock_connection(sql)?;
        let params: Vec<mysql::Value> = values.iter().map(to_mysql_value).collect();
        connection
            .exec_drop(sql, params)
            .map_err(|source| statement_error(sql, source))
    }

    fn current_schema(&self, connection: &mut PooledConn) -> Result<String> {
        connection
            .query_first::<String, _>(queries::CURRENT_SCHEMA_QUERY)
            .map_err(|source| statement_error(queries::CURRENT_SCHEMA_QUERY, source))?
            .ok_or_else(|| {
                statement_error(
                    queries::CURRENT_SCHEMA_QUERY,
                    io::Error::other("query returned no rows"),
                )
            })
    }
}

impl DbDriver for MysqlDriver {
    fn name(&self) -> &'static str {
        DIALECT_NAME
    }

    fn table_names(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let mut connection = self.lock_connection(queries::TABLE_NAMES_QUERY)?;
        let schema = match schema {
            Some(schema) => schema.to_string(),
            None => self.current_schema(&mut connection)?,
        };
        connection
            .exec::<String, _, _>(queries::TABLE_NAMES_QUERY, (schema,))
            .map_err(|source| statement_error(queries::TABLE_NAMES_QUERY, source))
    }

    fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let mut connection = self.lock_connection(queries::PRIMARY_KEYS_QUERY)?;
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (schema.to_string(), table.to_string()),
            None => (self.current_schema(&mut connection)?, table.to_string()),
        };
        connection
            .exec::<String, _, _>(queries::PRIMARY_KEYS_QUERY, (schema, table))
            .map_err(|source| statement_error(queries::PRIMARY_KEYS_QUERY, source))
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let mut connection = self.lock_connection(sql)?;
        connection
            .query_drop(sql)
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
        let mut connection = self.lock_connection(&sql)?;
        let rows: Vec<Row> = connection
            .query(sql.as_str())
            .map_err(|source| statement_error(&sql, source))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            self.token.ensure_active()?;
            let columns = row.columns();
            let values = row.unwrap();
            let mut decoded = BTreeMap::new();
            for (column, value) in columns.iter().zip(values) {
                decoded.insert(column.name_str().into_owned(), decode_value(value));
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

fn to_mysql_value(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Bool(value) => mysql::Value::Int(i64::from(*value)),
        Value::Int(value) => mysql::Value::Int(*value),
        Value::Float(value) => mysql::Value::Double(*value),
        Value::Str(value) => mysql::Value::Bytes(value.as_bytes().to_vec()),
        Value::Placeholder(placeholder) => {
            mysql::Value::Bytes(placeholder.token().as_bytes().to_vec())
        }
    }
}

fn decode_value(value: mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Bytes(bytes) => Value::Str(String::from_utf8_lossy(&bytes).into_owned()),
        mysql::Value::Int(value) => Value::Int(value),
        mysql::Value::UInt(value) => Value::Int(value as i64),
        mysql::Value::Float(value) => Value::Float(f64::from(value)),
        mysql::Value::Double(value) => Value::Float(value),
        mysql::Value::Date(year, month, day, hour, minute, second, _micros) => Value::Str(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        )),
        mysql::Value::Time(negative, days, hours, minutes, seconds, _micros) => {
            let sign = if negative { "-" } else { "" };
            let total_hours = u32::from(days) * 24 + u32::from(hours);
            Value::Str(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}

fn statement_error<E>(sql: &str, source: E) -> seedql_core::Error
where
    E: StdError + Send + Sync + 'static,
{
    DriverError::statement(sql, source).into()
}
