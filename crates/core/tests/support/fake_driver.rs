#![allow(dead_code)]

use std::{cell::RefCell, collections::BTreeMap, io};

use seedql_core::{DbDriver, DriverError, Result, Transaction, Value};

pub const BEGIN_SQL: &str = "BEGIN";
pub const COMMIT_SQL: &str = "COMMIT";
pub const ROLLBACK_SQL: &str = "ROLLBACK";

#[derive(Debug, Default)]
struct FailureRule {
    needle: String,
    message: String,
}

/// In-memory driver that journals every call as a rendered line, with canned
/// primary keys and rows per table.
#[derive(Debug, Default)]
pub struct FakeDriver {
    state: RefCell<FakeDriverState>,
}

#[derive(Debug, Default)]
struct FakeDriverState {
    table_names: Vec<String>,
    primary_keys: BTreeMap<String, Vec<String>>,
    rows: BTreeMap<String, Vec<BTreeMap<String, Value>>>,
    journal: Vec<String>,
    fail_on: Option<FailureRule>,
}

#[allow(dead_code)]
impl FakeDriver {
    pub fn set_table_names(&self, names: Vec<&str>) {
        self.state.borrow_mut().table_names = names.into_iter().map(str::to_string).collect();
    }

    pub fn set_primary_keys(&self, table: &str, keys: Vec<&str>) {
        self.state.borrow_mut().primary_keys.insert(
            table.to_string(),
            keys.into_iter().map(str::to_string).collect(),
        );
    }

    pub fn set_rows(&self, table: &str, rows: Vec<BTreeMap<String, Value>>) {
        self.state.borrow_mut().rows.insert(table.to_string(), rows);
    }

    /// Fails the first journaled call whose rendered line contains `needle`.
    pub fn fail_on(&self, needle: &str, message: &str) {
        self.state.borrow_mut().fail_on = Some(FailureRule {
            needle: needle.to_string(),
            message: message.to_string(),
        });
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.borrow().journal.clone()
    }

    fn record(&self, line: String) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(rule) = &state.fail_on {
            if line.contains(&rule.needle) {
                let message = rule.message.clone();
                return Err(DriverError::statement(line, io::Error::other(message)).into());
            }
        }
        state.journal.push(line);
        Ok(())
    }
}

impl DbDriver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn table_names(&self, _schema: Option<&str>) -> Result<Vec<String>> {
        let mut names = self.state.borrow().table_names.clone();
        names.sort();
        Ok(names)
    }

    fn primary_keys(&self, table: &str) -> Result<Vec<String>> {
        self.record(format!("primary_keys {table}"))?;
        Ok(self
            .state
            .borrow()
            .primary_keys
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.record(sql.to_string())
    }

    fn insert(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        self.record(format!(
            "insert {table} ({}) values [{}]",
            columns.join(", "),
            render_values(values)
        ))
    }

    fn upsert(
        &self,
        table: &str,
        columns: &[String],
        primary_keys: &[String],
        values: &[Value],
    ) -> Result<()> {
        self.record(format!(
            "upsert {table} ({}) keys ({}) values [{}]",
            columns.join(", "),
            primary_keys.join(", "),
            render_values(values)
        ))
    }

    fn delete(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        self.record(format!(
            "delete {table} ({}) values [{}]",
            columns.join(", "),
            render_values(values)
        ))
    }

    fn truncate(&self, table: &str) -> Result<()> {
        self.record(format!("truncate {table}"))
    }

    fn fetch_rows(&self, table: &str) -> Result<Vec<BTreeMap<String, Value>>> {
        Ok(self
            .state
            .borrow()
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    fn begin(&mut self) -> Result<Transaction<'_>> {
        self.execute(BEGIN_SQL)?;
        Ok(Transaction::new(self))
    }
}

fn render_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
