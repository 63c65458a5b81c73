use std::cmp::Ordering;

use crate::{
    dataset::{Row, Table},
    error::{DatasetError, MissingPrimaryKey},
    Result, Value,
};

/// One key/value pair of a normalized row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

impl Field {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A table shaped for comparison: every row starts with the primary-key
/// columns in sorted name order, followed by the remaining columns in sorted
/// name order, and the rows are sorted by the primary-key prefix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedTable {
    pub name: String,
    pub rows: Vec<Vec<Field>>,
}

impl Table {
    /// Applies the tag filter, validates primary-key presence, and emits the
    /// normalized row shape. Rows missing primary-key columns are collected
    /// and reported together.
    pub fn sort_and_filter(
        &self,
        primary_keys: &[String],
        include_tags: &[String],
        exclude_tags: &[String],
    ) -> Result<NormalizedTable> {
        let mut keys = primary_keys.to_vec();
        keys.sort();

        let mut failures = Vec::new();
        let mut rows = Vec::with_capacity(self.rows.len());

        for (index, row) in self.rows.iter().enumerate() {
            let tags = self.tags.get(index).map(Vec::as_slice).unwrap_or_default();
            if !tag_filter(tags, include_tags, exclude_tags) {
                continue;
            }
            match row_fields(row, &keys) {
                Ok(fields) => rows.push(fields),
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            return Err(DatasetError::MissingPrimaryKeys {
                table: self.name.clone(),
                rows: failures,
            }
            .into());
        }

        sort_rows(&mut rows, keys.len());
        Ok(NormalizedTable {
            name: self.name.clone(),
            rows,
        })
    }
}

/// Shared include/exclude rule: any excluded tag rejects the row; an empty
/// include set accepts everything else; otherwise every included tag must be
/// present.
pub fn tag_filter(tags: &[String], includes: &[String], excludes: &[String]) -> bool {
    if excludes.iter().any(|exclude| tags.contains(exclude)) {
        return false;
    }
    if includes.is_empty() {
        return true;
    }
    includes.iter().all(|include| tags.contains(include))
}

pub(crate) fn row_fields(
    row: &Row,
    sorted_keys: &[String],
) -> std::result::Result<Vec<Field>, MissingPrimaryKey> {
    let mut fields = Vec::with_capacity(row.len());
    let mut missing = Vec::new();

    for key in sorted_keys {
        match row.get(key) {
            Some(value) => fields.push(Field::new(key.clone(), value.clone())),
            None => missing.push(key.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(MissingPrimaryKey {
            missing,
            row: dump_row(row),
        });
    }

    // BTreeMap iteration already yields the remaining columns name-sorted.
    for (key, value) in row {
        if !sorted_keys.iter().any(|sorted| sorted == key) {
            fields.push(Field::new(key.clone(), value.clone()));
        }
    }

    Ok(fields)
}

pub(crate) fn sort_rows(rows: &mut [Vec<Field>], key_count: usize) {
    rows.sort_by(|left, right| compare_key(key_count, left, right));
}

pub(crate) fn compare_key(key_count: usize, left: &[Field], right: &[Field]) -> Ordering {
    for index in 0..key_count {
        let ordering = left[index].value.sort_cmp(&right[index].value);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn dump_row(row: &Row) -> String {
    serde_json::to_string(row).unwrap_or_else(|_| format!("{row:?}"))
}
