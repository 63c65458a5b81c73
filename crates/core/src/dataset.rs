use std::{collections::BTreeMap, fmt, io::Read};

use serde::{
    de::{self, MapAccess, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::{
    error::{ParseError, SourceLocation},
    Result, Value,
};

/// Reserved top-level key mapping table names to seed operations.
pub const OPERATION_KEY: &str = "_operation";
/// Reserved top-level key mapping table names to match strategies.
pub const MATCH_KEY: &str = "_match";
/// Reserved per-row key carrying filter tags.
pub const TAG_KEY: &str = "_tag";

/// Per-table action applied during seeding.
///
/// The default is `ClearInsert`: a table whose operation is left unspecified
/// is truncated before its rows are inserted, so a dataset that lists only
/// some of a table's rows erases the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    #[default]
    ClearInsert,
    Insert,
    Upsert,
    Delete,
    Truncate,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearInsert => "clear-insert",
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Truncate => "truncate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-table rule applied during assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    #[default]
    Exact,
    Sub,
}

impl MatchStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Sub => "sub",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dataset row: column name to value. Duplicate keys in the document are
/// accepted by the decoder, the last occurrence wins.
pub type Row = BTreeMap<String, Value>;

/// One table of a dataset. `tags` always has the same length as `rows`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub rows: Vec<Row>,
    pub tags: Vec<Vec<String>>,
}

/// A parsed dataset document. Tables keep document order because seeding
/// order matters for foreign-key constrained databases.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    pub operations: BTreeMap<String, Operation>,
    pub matches: BTreeMap<String, MatchStrategy>,
    pub tables: Vec<Table>,
}

impl DataSet {
    #[must_use]
    pub fn operation_for(&self, table: &str) -> Operation {
        self.operations.get(table).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn match_for(&self, table: &str) -> MatchStrategy {
        self.matches.get(table).copied().unwrap_or_default()
    }
}

/// Reads a YAML dataset document from the reader.
pub fn parse_dataset(mut reader: impl Read) -> Result<DataSet> {
    let mut document = String::new();
    reader
        .read_to_string(&mut document)
        .map_err(|source| ParseError::InvalidDocument {
            location: None,
            source: Box::new(source),
        })?;
    parse_dataset_str(&document)
}

/// Reads a YAML dataset document from a string slice. An empty document is
/// a valid, empty dataset.
pub fn parse_dataset_str(yaml: &str) -> Result<DataSet> {
    if yaml.trim().is_empty() {
        return Ok(DataSet::default());
    }
    serde_yaml::from_str(yaml).map_err(parse_error)
}

fn parse_error(source: serde_yaml::Error) -> crate::Error {
    let location = source.location().map(|location| SourceLocation {
        line: location.line(),
        column: Some(location.column()),
    });

    ParseError::InvalidDocument {
        location,
        source: Box::new(source),
    }
    .into()
}

impl<'de> Deserialize<'de> for DataSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(DataSetVisitor)
    }
}

struct DataSetVisitor;

impl<'de> Visitor<'de> for DataSetVisitor {
    type Value = DataSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of table names to row sequences")
    }

    // An empty document is a valid, empty dataset.
    fn visit_unit<E: de::Error>(self) -> std::result::Result<DataSet, E> {
        Ok(DataSet::default())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<DataSet, E> {
        Ok(DataSet::default())
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<DataSet, M::Error> {
        let mut data = DataSet::default();

        while let Some(key) = map.next_key::<String>()? {
            if key == OPERATION_KEY {
                data.operations = map.next_value()?;
            } else if key == MATCH_KEY {
                data.matches = map.next_value()?;
            } else {
                let rows: Vec<RawRow> = map.next_value()?;
                let table = build_table(key, rows);
                // A repeated table key replaces the earlier body.
                match data.tables.iter_mut().find(|t| t.name == table.name) {
                    Some(existing) => *existing = table,
                    None => data.tables.push(table),
                }
            }
        }

        Ok(data)
    }
}

fn build_table(name: String, raw_rows: Vec<RawRow>) -> Table {
    let mut table = Table {
        name,
        rows: Vec::with_capacity(raw_rows.len()),
        tags: Vec::with_capacity(raw_rows.len()),
    };
    for raw in raw_rows {
        table.rows.push(raw.columns);
        table.tags.push(raw.tags);
    }
    table
}

struct RawRow {
    columns: Row,
    tags: Vec<String>,
}

impl<'de> Deserialize<'de> for RawRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(RawRowVisitor)
    }
}

struct RawRowVisitor;

impl<'de> Visitor<'de> for RawRowVisitor {
    type Value = RawRow;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a row mapping of column names to values")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> std::result::Result<RawRow, M::Error> {
        let mut row = RawRow {
            columns: Row::new(),
            tags: Vec::new(),
        };

        while let Some(key) = map.next_key::<String>()? {
            if key == TAG_KEY {
                row.tags = map.next_value::<TagList>()?.0;
            } else {
                // Last occurrence wins for duplicate column keys.
                let value = map.next_value::<Value>()?;
                row.columns.insert(key, value);
            }
        }

        Ok(row)
    }
}

struct TagList(Vec<String>);

impl<'de> Deserialize<'de> for TagList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TagListVisitor)
    }
}

struct TagListVisitor;

impl<'de> Visitor<'de> for TagListVisitor {
    type Value = TagList;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a comma-separated tag string or a sequence of tag names")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<TagList, E> {
        let tags = value
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        Ok(TagList(tags))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<TagList, A::Error> {
        let mut tags = Vec::new();
        while let Some(element) = seq.next_element::<Value>()? {
            match element {
                Value::Str(tag) => tags.push(tag),
                other => tags.push(other.to_string()),
            }
        }
        Ok(TagList(tags))
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<TagList, E> {
        Err(invalid_tag_error(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<TagList, E> {
        Err(invalid_tag_error(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<TagList, E> {
        Err(invalid_tag_error(value))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<TagList, E> {
        Err(invalid_tag_error(value))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<TagList, E> {
        Err(invalid_tag_error("null"))
    }
}

fn invalid_tag_error<E: de::Error>(value: impl fmt::Display) -> E {
    E::custom(format!(
        "tag should be string or [string...], but: '{value}'"
    ))
}
