use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::{
    error::DatasetError,
    normalize::{compare_key, row_fields, sort_rows},
    CancelToken, DataSet, DbDriver, Error, Field, MatchStrategy, Placeholder, Result, Value,
};

/// Outcome of a table, row, or field comparison. The serialized names are the
/// wire format used by the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssertStatus {
    #[serde(rename = "match")]
    Match,
    #[serde(rename = "not-match")]
    NotMatch,
    /// The row exists only in the dataset.
    #[serde(rename = "only-e")]
    OnlyOnExpect,
    /// The row exists only in the database.
    #[serde(rename = "only-a")]
    OnlyOnActual,
    /// The dataset lists a column the database does not return.
    #[serde(rename = "wrongDataSet")]
    WrongDataSet,
}

impl AssertStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::NotMatch => "not-match",
            Self::OnlyOnExpect => "only-e",
            Self::OnlyOnActual => "only-a",
            Self::WrongDataSet => "wrongDataSet",
        }
    }
}

impl fmt::Display for AssertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub key: String,
    pub expect: Option<Value>,
    pub actual: Option<Value>,
    pub status: AssertStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    pub fields: Vec<FieldDiff>,
    pub status: AssertStatus,
}

/// The diff of one asserted table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableAssertion {
    pub name: String,
    pub primary_keys: Vec<String>,
    pub rows: Vec<RowDiff>,
    pub status: AssertStatus,
}

impl TableAssertion {
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.status == AssertStatus::Match
    }
}

/// Invoked twice per table: once with `start = true` before fetching, once
/// with `start = false` carrying any fetch error.
pub type AssertProgress<'a> = Box<dyn FnMut(&str, MatchStrategy, bool, Option<&Error>) + 'a>;

/// Receives each per-table diff as soon as it is computed.
pub type DiffSink<'a> = Box<dyn FnMut(&TableAssertion) + 'a>;

#[derive(Default)]
pub struct AssertOptions<'a> {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// When non-empty, tables not listed are skipped entirely.
    pub target_tables: Vec<String>,
    pub progress: Option<AssertProgress<'a>>,
    pub diff: Option<DiffSink<'a>>,
}

/// Compares the database against the expected dataset. Returns whether every
/// asserted table matched, together with the per-table diffs. Fetch and
/// normalization errors are accumulated across tables and joined; when any
/// occurred no results are returned.
pub fn assert_dataset(
    token: &CancelToken,
    driver: &dyn DbDriver,
    expected: &DataSet,
    options: AssertOptions<'_>,
) -> Result<(bool, Vec<TableAssertion>)> {
    let AssertOptions {
        include_tags,
        exclude_tags,
        target_tables,
        mut progress,
        mut diff,
    } = options;

    let mut errors = Vec::new();
    let mut results = Vec::new();
    let mut all_match = true;

    for table in &expected.tables {
        if !target_tables.is_empty() && !target_tables.iter().any(|t| t == &table.name) {
            continue;
        }
        let strategy = expected.match_for(&table.name);

        if let Some(callback) = progress.as_mut() {
            callback(&table.name, strategy, true, None);
        }
        let fetched = token
            .ensure_active()
            .and_then(|()| fetch_table(driver, &table.name));
        if let Some(callback) = progress.as_mut() {
            callback(&table.name, strategy, false, fetched.as_ref().err());
        }
        let (actual, sort_keys) = match fetched {
            Ok(fetched) => fetched,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        let normalized = match table.sort_and_filter(&sort_keys, &include_tags, &exclude_tags) {
            Ok(normalized) => normalized,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        let assertion =
            match compare_table(&table.name, strategy, &sort_keys, &normalized.rows, &actual) {
                Ok(assertion) => assertion,
                Err(error) => {
                    errors.push(error);
                    continue;
                }
            };

        if !assertion.is_match() {
            all_match = false;
        }
        if let Some(sink) = diff.as_mut() {
            sink(&assertion);
        }
        results.push(assertion);
    }

    if !errors.is_empty() {
        return Err(Error::join(errors));
    }
    Ok((all_match, results))
}

/// Fetches the actual rows of `table` in normalized shape, plus the sorted
/// primary-key list used as the sort key.
fn fetch_table(driver: &dyn DbDriver, table: &str) -> Result<(Vec<Vec<Field>>, Vec<String>)> {
    let mut sort_keys = driver.primary_keys(table)?;
    sort_keys.sort();

    let raw_rows = driver.fetch_rows(table)?;
    let mut rows = Vec::with_capacity(raw_rows.len());
    for row in &raw_rows {
        let fields = row_fields(row, &sort_keys).map_err(|failure| {
            Error::from(DatasetError::MissingPrimaryKeys {
                table: table.to_string(),
                rows: vec![failure],
            })
        })?;
        rows.push(fields);
    }
    sort_rows(&mut rows, sort_keys.len());

    Ok((rows, sort_keys))
}

/// Sorted merge over the pk-sorted row sequences. `Sub` strategy ignores rows
/// that exist only in the database.
fn compare_table(
    name: &str,
    strategy: MatchStrategy,
    primary_keys: &[String],
    expected: &[Vec<Field>],
    actual: &[Vec<Field>],
) -> Result<TableAssertion> {
    let key_count = primary_keys.len();
    let mut rows = Vec::new();
    let mut all_match = true;
    let (mut i, mut j) = (0, 0);

    while i < expected.len() && j < actual.len() {
        match compare_key(key_count, &expected[i], &actual[j]) {
            Ordering::Equal => {
                let row = compare_row(key_count, &expected[i], &actual[j])?;
                if row.status != AssertStatus::Match {
                    all_match = false;
                }
                rows.push(row);
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                rows.push(one_sided_row(&expected[i], AssertStatus::OnlyOnExpect));
                all_match = false;
                i += 1;
            }
            Ordering::Greater => {
                if strategy == MatchStrategy::Exact {
                    rows.push(one_sided_row(&actual[j], AssertStatus::OnlyOnActual));
                    all_match = false;
                }
                j += 1;
            }
        }
    }
    while i < expected.len() {
        rows.push(one_sided_row(&expected[i], AssertStatus::OnlyOnExpect));
        all_match = false;
        i += 1;
    }
    if strategy == MatchStrategy::Exact {
        while j < actual.len() {
            rows.push(one_sided_row(&actual[j], AssertStatus::OnlyOnActual));
            all_match = false;
            j += 1;
        }
    }

    Ok(TableAssertion {
        name: name.to_string(),
        primary_keys: primary_keys.to_vec(),
        rows,
        status: if all_match {
            AssertStatus::Match
        } else {
            AssertStatus::NotMatch
        },
    })
}

fn one_sided_row(fields: &[Field], status: AssertStatus) -> RowDiff {
    let fields = fields
        .iter()
        .map(|field| {
            let (expect, actual) = if status == AssertStatus::OnlyOnActual {
                (None, Some(field.value.clone()))
            } else {
                (Some(field.value.clone()), None)
            };
            FieldDiff {
                key: field.key.clone(),
                expect,
                actual,
                status,
            }
        })
        .collect();
    RowDiff { fields, status }
}

/// Field-wise comparison of two rows with matching primary keys. Both sides
/// are field-sorted, so the walk is a two-pointer merge over the key names.
/// Columns present only in the database are skipped, which permits omitting
/// system columns from a dataset.
fn compare_row(offset: usize, expected: &[Field], actual: &[Field]) -> Result<RowDiff> {
    let mut fields = Vec::with_capacity(expected.len());
    for index in 0..offset {
        fields.push(FieldDiff {
            key: expected[index].key.clone(),
            expect: Some(expected[index].value.clone()),
            actual: Some(actual[index].value.clone()),
            status: AssertStatus::Match,
        });
    }

    let mut all_match = true;
    let (mut i, mut j) = (offset, offset);
    while i < expected.len() && j < actual.len() {
        let e = &expected[i];
        let a = &actual[j];
        if e.key == a.key {
            i += 1;
            j += 1;
            let matched = values_match(&e.value, &a.value)?;
            if !matched {
                all_match = false;
            }
            fields.push(FieldDiff {
                key: e.key.clone(),
                expect: Some(e.value.clone()),
                actual: Some(a.value.clone()),
                status: if matched {
                    AssertStatus::Match
                } else {
                    AssertStatus::NotMatch
                },
            });
        } else if e.key > a.key {
            j += 1;
        } else {
            i += 1;
            fields.push(FieldDiff {
                key: e.key.clone(),
                expect: Some(e.value.clone()),
                actual: None,
                status: AssertStatus::WrongDataSet,
            });
            all_match = false;
        }
    }
    while i < expected.len() {
        fields.push(FieldDiff {
            key: expected[i].key.clone(),
            expect: Some(expected[i].value.clone()),
            actual: None,
            status: AssertStatus::WrongDataSet,
        });
        all_match = false;
        i += 1;
    }

    Ok(RowDiff {
        fields,
        status: if all_match {
            AssertStatus::Match
        } else {
            AssertStatus::NotMatch
        },
    })
}

fn values_match(expect: &Value, actual: &Value) -> Result<bool> {
    if let Value::Placeholder(placeholder) = expect {
        return match placeholder {
            Placeholder::Null => Ok(actual.is_null()),
            Placeholder::NotNull => Ok(!actual.is_null()),
            Placeholder::Any => Ok(true),
            Placeholder::Other(token) => Err(DatasetError::UnsupportedPlaceholder {
                token: token.clone(),
            }
            .into()),
        };
    }
    Ok(expect == actual)
}

impl fmt::Display for TableAssertion {
    /// Plain-text diff rendering shared by the HTTP surface and the test
    /// helper. Primary keys lead each row; expected lines are prefixed `+`,
    /// actual lines `-`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "'{}' table", self.name)?;
        if self.is_match() {
            return writeln!(f, "  OK");
        }
        writeln!(f, "+ Expected")?;
        writeln!(f, "- Actual")?;
        writeln!(f)?;

        let key_count = self.primary_keys.len();
        for row in &self.rows {
            for (index, field) in row.fields.iter().take(key_count).enumerate() {
                let value = if row.status == AssertStatus::OnlyOnActual {
                    &field.actual
                } else {
                    &field.expect
                };
                write!(f, "{}: {}", field.key, render_optional(value))?;
                if index + 1 == key_count {
                    writeln!(f)?;
                } else {
                    write!(f, ", ")?;
                }
            }
            match row.status {
                AssertStatus::Match => {
                    write!(f, "  ")?;
                    write_side(f, row, key_count, |field| &field.expect)?;
                    writeln!(f)?;
                }
                AssertStatus::OnlyOnExpect => {
                    write!(f, "+ ")?;
                    write_side(f, row, key_count, |field| &field.expect)?;
                    writeln!(f)?;
                }
                AssertStatus::OnlyOnActual => {
                    write!(f, "- ")?;
                    write_side(f, row, key_count, |field| &field.actual)?;
                    writeln!(f)?;
                }
                _ => {
                    write!(f, "+ ")?;
                    write_side(f, row, key_count, |field| &field.expect)?;
                    writeln!(f)?;
                    write!(f, "- ")?;
                    write_side(f, row, key_count, |field| &field.actual)?;
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

fn write_side(
    f: &mut fmt::Formatter<'_>,
    row: &RowDiff,
    key_count: usize,
    side: impl Fn(&FieldDiff) -> &Option<Value>,
) -> fmt::Result {
    for (index, field) in row.fields.iter().enumerate().skip(key_count) {
        if index != key_count {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", field.key, render_optional(side(field)))?;
    }
    Ok(())
}

fn render_optional(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "null".to_string(),
    }
}
