use std::{
    collections::BTreeMap,
    error::Error as StdError,
    io,
    sync::{Mutex, MutexGuard},
};

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres::{
    types::{to_sql_checked, IsNull, ToSql, Type},
    Client, NoTls, Row,
};
use seedql_core::{CancelToken, DbDriver, DriverError, Result, Transaction, Value};

use crate::{queries, statements};

const BEGIN_SQL: &str = "BEGIN";
const DIALECT_NAME: &str = "postgres";
const POISONED_CLIENT_MESSAGE: &str = "postgres connection state was poisoned";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) struct PostgresDriver {
    client: Mutex<Client>,
    token: CancelToken,
}

/// Connects using the full `postgres://` URL, which is the native DSN form of
/// the driver. The token is checked before every statement.
pub fn connect(url: &str, token: CancelToken) -> Result<Box<dyn DbDriver>> {
    let client =
        Client::connect(url, NoTls).map_err(|source| DriverError::connect(DIALECT_NAME, source))?;

    Ok(Box::new(PostgresDriver {
        client: Mutex::new(client),
        token,
    }))
}

impl PostgresDriver {
    fn lock_client(&self, sql: &str) -> Result<MutexGuard<'_, Client>> {
        self.token.ensure_active()?;
        self.client
            .lock()
            .map_err(|_| statement_error(sql, io::Error::other(POISONED_CLIENT_MESSAGE)))
    }

    fn run_with_params(&self, sql: &str, values: &[Value]) -> Result<()> {
        let mut client = self.lock_client(sql)?;
        let params: Vec<PgValue<'_>> = values.iter().map(PgValue).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|param| param as &(dyn ToSql + Sync))
            .collect();
        client
            .execute(sql, &refs)
            .map_err(|source| statement_error(sql, source))?;
        Ok(())
    }

    fn current_schema(&self, client: &mut Client) -> Result<String> {
        let row = client
            .query_one(queries::CURRENT_SCHEMA_QUERY, &[])
            .map_err(|source| statement_error(queries::CURRENT_SCHEMA_QUERY, source))?;
        row.try_get(0)
            .map_err(|source| statement_error(queries::CURRENT_SCHEMA_QUERY, source))
    }
}

impl DbDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        DIALECT_NAME
    }

    fn table_names(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let mut client = self.lock_client(queries::TABLE_NAMES_QUERY)?;
        let schema = match schema {
            Some(schema) => schema.to_string(),
            None => self.current_schema(&mut client)?,
        };
        let rows = client
            .query(queries::TABLE_NAMES_QUERY, &[&schema])
            .map_err(|source| statement_error(queries::TABLE_NAMES_QUERY, source))?;
        rows.iter()
            .map(|row| {
                row.try_get(0)
                    .map_err(|source| statement_error(queries::TABLE_NAMES_QUERY, source))
            })
            .collect()
    }

    fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let mut client = self.lock_client(queries::PRIMARY_KEYS_QUERY)?;
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (schema.to_string(), table.to_string()),
            None => (self.current_schema(&mut client)?, table.to_string()),
        };
        let rows = client
            .query(queries::PRIMARY_KEYS_QUERY, &[&schema, &table])
            .map_err(|source| statement_error(queries::PRIMARY_KEYS_QUERY, source))?;
        rows.iter()
            .map(|row| {
                row.try_get(0)
                    .map_err(|source| statement_error(queries::PRIMARY_KEYS_QUERY, source))
            })
            .collect()
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let mut client = self.lock_client(sql)?;
        client
            .batch_execute(sql)
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
        let mut client = self.lock_client(&sql)?;
        let rows = client
            .query(sql.as_str(), &[])
            .map_err(|source| statement_error(&sql, source))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            self.token.ensure_active()?;
            let mut decoded = BTreeMap::new();
            for index in 0..row.columns().len() {
                let column = &row.columns()[index];
                decoded.insert(
                    column.name().to_string(),
                    decode_column(row, index, table)?,
                );
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

#[derive(Debug)]
struct PgValue<'a>(&'a Value);

impl ToSql for PgValue<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(value) => value.to_sql(ty, out),
            Value::Int(value) => {
                if *ty == Type::INT2 {
                    (*value as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*value as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*value as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*value as f64).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    value.to_string().to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            Value::Float(value) => {
                if *ty == Type::FLOAT4 {
                    (*value as f32).to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            Value::Str(value) => string_to_sql(value, ty, out),
            Value::Placeholder(placeholder) => placeholder.token().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

// Strings headed for typed columns are converted through the matching Rust
// type so the binary protocol encoding is correct.
fn string_to_sql(
    value: &str,
    ty: &Type,
    out: &mut BytesMut,
) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
    if *ty == Type::DATE {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        parse_naive_datetime(value)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        DateTime::parse_from_rfc3339(value)?
            .with_timezone(&Utc)
            .to_sql(ty, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(value)?.to_sql(ty, out)
    } else {
        value.to_sql(ty, out)
    }
}

fn parse_naive_datetime(value: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
}

fn decode_column(row: &Row, index: usize, table: &str) -> Result<Value> {
    let column = &row.columns()[index];
    let ty = column.type_();

    let decoded = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index).map(|value| value.map(Value::Bool))
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .map(|value| value.map(|v| Value::Int(i64::from(v))))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .map(|value| value.map(|v| Value::Int(i64::from(v))))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)
            .map(|value| value.map(Value::Int))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .map(|value| value.map(|v| Value::Float(f64::from(v))))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)
            .map(|value| value.map(Value::Float))
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(index)
            .map(|value| value.map(|v| Value::Str(String::from_utf8_lossy(&v).into_owned())))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(index)
            .map(|value| value.map(|v| Value::Str(v.to_string())))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(index)
            .map(|value| value.map(|v| Value::Str(v.format(TIMESTAMP_FORMAT).to_string())))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(index)
            .map(|value| value.map(|v| Value::Str(v.to_rfc3339())))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(index)
            .map(|value| value.map(|v| Value::Str(v.to_string())))
    } else {
        row.try_get::<_, Option<String>>(index)
            .map(|value| value.map(Value::Str))
    };

    match decoded {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(Value::Null),
        Err(source) => Err(DriverError::Decode {
            table: table.to_string(),
            column: column.name().to_string(),
            detail: source.to_string(),
        }
        .into()),
    }
}

fn statement_error<E>(sql: &str, source: E) -> seedql_core::Error
where
    E: StdError + Send + Sync + 'static,
{
    DriverError::statement(sql, source).into()
}
