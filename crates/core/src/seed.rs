use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{
    dataset::Row,
    normalize::tag_filter,
    CancelToken, DataSet, DbDriver, Error, Operation, Result, Table, Transaction, Value,
};

/// Number of rows written per SQL statement when the caller does not choose.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Task name reported to the seed progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedTask {
    Truncate,
    Insert,
    Upsert,
    Delete,
}

impl SeedTask {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Truncate => "truncate",
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SeedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoked twice per operation per table: once with `start = true`, once with
/// `start = false` carrying any error. Must not touch the transaction.
pub type SeedProgress<'a> = Box<dyn FnMut(&str, SeedTask, bool, Option<&Error>) + 'a>;

pub struct SeedOptions<'a> {
    /// Rows per statement; `0` falls back to [`DEFAULT_BATCH_SIZE`].
    pub batch_size: usize,
    /// Overrides layered on top of the dataset's `_operation` map.
    pub operations: BTreeMap<String, Operation>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// When non-empty, tables not listed are skipped entirely.
    pub target_tables: Vec<String>,
    pub progress: Option<SeedProgress<'a>>,
}

impl Default for SeedOptions<'_> {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            operations: BTreeMap::new(),
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            target_tables: Vec::new(),
            progress: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataAction {
    Insert,
    Upsert,
    Delete,
    /// Truncate-only tables take no part in the data phase.
    None,
}

/// The derived execution plan: which tables enter the truncate phase and what
/// the data phase does per table, instead of mutating a shared operation map
/// mid-iteration.
#[derive(Debug, Default, PartialEq, Eq)]
struct SeedPlan {
    truncate: BTreeSet<String>,
    actions: BTreeMap<String, DataAction>,
}

fn build_plan(
    dataset: &DataSet,
    overrides: &BTreeMap<String, Operation>,
    target_tables: &[String],
) -> SeedPlan {
    let in_scope =
        |table: &str| target_tables.is_empty() || target_tables.iter().any(|t| t == table);
    let effective = |table: &str| {
        overrides
            .get(table)
            .or_else(|| dataset.operations.get(table))
            .copied()
    };

    let mut plan = SeedPlan::default();

    for table in &dataset.tables {
        if !in_scope(&table.name) {
            continue;
        }
        let action = match effective(&table.name).unwrap_or_default() {
            Operation::ClearInsert => {
                plan.truncate.insert(table.name.clone());
                DataAction::Insert
            }
            Operation::Insert => DataAction::Insert,
            Operation::Upsert => DataAction::Upsert,
            Operation::Delete => DataAction::Delete,
            Operation::Truncate => {
                plan.truncate.insert(table.name.clone());
                DataAction::None
            }
        };
        plan.actions.insert(table.name.clone(), action);
    }

    // Tables named only in the operation maps (no dataset body) still get
    // truncated; this is how the CLI's --truncate flag arrives here.
    for (table, operation) in dataset.operations.iter().chain(overrides.iter()) {
        if *operation == Operation::Truncate
            && in_scope(table)
            && effective(table) == Some(Operation::Truncate)
        {
            plan.truncate.insert(table.clone());
        }
    }

    plan
}

/// Drives the database into the dataset's state. The whole run happens inside
/// one transaction: the truncate phase completes for every marked table before
/// any data is written, tables are then processed in dataset order, and any
/// error rolls everything back.
pub fn seed(
    token: &CancelToken,
    driver: &mut dyn DbDriver,
    dataset: &DataSet,
    options: SeedOptions<'_>,
) -> Result<()> {
    token.ensure_active()?;

    let SeedOptions {
        batch_size,
        operations,
        include_tags,
        exclude_tags,
        target_tables,
        mut progress,
    } = options;
    let batch_size = if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    };

    let plan = build_plan(dataset, &operations, &target_tables);
    log::debug!(
        "seed plan: {} truncate target(s), {} data table(s), batch size {}",
        plan.truncate.len(),
        plan.actions.len(),
        batch_size
    );

    let mut tx = driver.begin()?;

    for table in &plan.truncate {
        report(&mut progress, table, SeedTask::Truncate, true, None);
        let result = token.ensure_active().and_then(|()| tx.truncate(table));
        report(&mut progress, table, SeedTask::Truncate, false, result.as_ref().err());
        result?;
    }

    for table in &dataset.tables {
        let Some(action) = plan.actions.get(&table.name) else {
            continue;
        };
        let task = match action {
            DataAction::Insert => SeedTask::Insert,
            DataAction::Upsert => SeedTask::Upsert,
            DataAction::Delete => SeedTask::Delete,
            DataAction::None => continue,
        };

        report(&mut progress, &table.name, task, true, None);
        let result = match action {
            DataAction::Insert => write_batches(
                token, &mut tx, table, batch_size, &include_tags, &exclude_tags, false,
            ),
            DataAction::Upsert => write_batches(
                token, &mut tx, table, batch_size, &include_tags, &exclude_tags, true,
            ),
            DataAction::Delete => {
                delete_batches(token, &mut tx, table, batch_size, &include_tags, &exclude_tags)
            }
            DataAction::None => unreachable!(),
        };
        report(&mut progress, &table.name, task, false, result.as_ref().err());
        result?;
    }

    tx.commit()
}

fn write_batches(
    token: &CancelToken,
    tx: &mut Transaction<'_>,
    table: &Table,
    batch_size: usize,
    include_tags: &[String],
    exclude_tags: &[String],
    upsert: bool,
) -> Result<()> {
    let primary_keys = if upsert {
        tx.primary_keys(&table.name)?
    } else {
        Vec::new()
    };

    for (batch_index, batch) in table.rows.chunks(batch_size).enumerate() {
        token.ensure_active()?;
        let offset = batch_index * batch_size;
        let columns = batch_columns(batch);
        let values = project_rows(table, batch, offset, &columns, include_tags, exclude_tags);
        if values.is_empty() {
            continue;
        }
        if upsert {
            tx.upsert(&table.name, &columns, &primary_keys, &values)?;
        } else {
            tx.insert(&table.name, &columns, &values)?;
        }
    }

    Ok(())
}

fn delete_batches(
    token: &CancelToken,
    tx: &mut Transaction<'_>,
    table: &Table,
    batch_size: usize,
    include_tags: &[String],
    exclude_tags: &[String],
) -> Result<()> {
    let columns = tx.primary_keys(&table.name)?;

    for (batch_index, batch) in table.rows.chunks(batch_size).enumerate() {
        token.ensure_active()?;
        let offset = batch_index * batch_size;
        let values = project_rows(table, batch, offset, &columns, include_tags, exclude_tags);
        if values.is_empty() {
            continue;
        }
        tx.delete(&table.name, &columns, &values)?;
    }

    Ok(())
}

/// Union of the column names present anywhere in the batch, name-sorted for
/// a deterministic statement shape.
fn batch_columns(batch: &[Row]) -> Vec<String> {
    let mut columns = BTreeSet::new();
    for row in batch {
        for key in row.keys() {
            columns.insert(key.clone());
        }
    }
    columns.into_iter().collect()
}

/// Projects the kept rows of a batch onto the column order, substituting null
/// for absent columns. The column union is computed before filtering, so a
/// filtered-out row can still widen the statement.
fn project_rows(
    table: &Table,
    batch: &[Row],
    offset: usize,
    columns: &[String],
    include_tags: &[String],
    exclude_tags: &[String],
) -> Vec<Value> {
    let mut values = Vec::with_capacity(batch.len() * columns.len());
    for (index, row) in batch.iter().enumerate() {
        let tags = table
            .tags
            .get(offset + index)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if !tag_filter(tags, include_tags, exclude_tags) {
            continue;
        }
        for column in columns {
            values.push(row.get(column).cloned().unwrap_or(Value::Null));
        }
    }
    values
}

fn report(
    progress: &mut Option<SeedProgress<'_>>,
    table: &str,
    task: SeedTask,
    start: bool,
    error: Option<&Error>,
) {
    if let Some(callback) = progress.as_mut() {
        callback(table, task, start, error);
    }
}
