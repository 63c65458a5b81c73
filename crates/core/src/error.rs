use std::{error::Error as StdError, fmt};

type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// Position inside the dataset document, when the YAML decoder reports one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: Option<usize>,
}

#[derive(Debug)]
pub enum ParseError {
    InvalidDocument {
        location: Option<SourceLocation>,
        source: BoxedError,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDocument { location, .. } => {
                write!(
                    f,
                    "dataset document is not valid (location={})",
                    format_location(location.as_ref())
                )
            }
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidDocument { source, .. } => Some(source.as_ref()),
        }
    }
}

/// One row that does not carry every primary-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingPrimaryKey {
    pub missing: Vec<String>,
    pub row: String,
}

impl fmt::Display for MissingPrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing primary keys: [{}] in row {}",
            self.missing.join(", "),
            self.row
        )
    }
}

#[derive(Debug)]
pub enum DatasetError {
    MissingPrimaryKeys {
        table: String,
        rows: Vec<MissingPrimaryKey>,
    },
    UnsupportedPlaceholder {
        token: String,
    },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrimaryKeys { table, rows } => {
                write!(f, "table `{table}`: ")?;
                for (index, row) in rows.iter().enumerate() {
                    if index > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{row}")?;
                }
                Ok(())
            }
            Self::UnsupportedPlaceholder { token } => {
                write!(f, "unsupported placeholder: [{token}]")
            }
        }
    }
}

impl StdError for DatasetError {}

#[derive(Debug)]
pub enum DriverError {
    InvalidScheme {
        conn: String,
    },
    DisabledDialect {
        dialect: &'static str,
    },
    Connect {
        dialect: &'static str,
        source: BoxedError,
    },
    Statement {
        sql: String,
        source: BoxedError,
    },
    Decode {
        table: String,
        column: String,
        detail: String,
    },
}

impl DriverError {
    pub fn statement<E>(sql: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Statement {
            sql: sql.into(),
            source: Box::new(source),
        }
    }

    pub fn connect<E>(dialect: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Connect {
            dialect,
            source: Box::new(source),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScheme { conn } => write!(f, "invalid db driver: '{conn}'"),
            Self::DisabledDialect { dialect } => {
                write!(f, "dialect `{dialect}` is not enabled in this build")
            }
            Self::Connect { dialect, .. } => write!(f, "can't connect to {dialect}"),
            Self::Statement { sql, .. } => write!(f, "statement failed: {sql}"),
            Self::Decode {
                table,
                column,
                detail,
            } => write!(f, "can't decode `{table}`.`{column}`: {detail}"),
        }
    }
}

impl StdError for DriverError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connect { source, .. } | Self::Statement { source, .. } => Some(source.as_ref()),
            Self::InvalidScheme { .. } | Self::DisabledDialect { .. } | Self::Decode { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Dataset(DatasetError),
    Driver(DriverError),
    Cancelled,
    Multiple(Vec<Error>),
}

impl Error {
    /// Collapses accumulated per-table errors into one value; a single
    /// error is returned unwrapped.
    pub fn join(mut errors: Vec<Error>) -> Error {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Error::Multiple(errors)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(source) => write!(f, "{source}"),
            Self::Dataset(source) => write!(f, "{source}"),
            Self::Driver(source) => write!(f, "{source}"),
            Self::Cancelled => f.write_str("operation cancelled"),
            Self::Multiple(errors) => {
                for (index, error) in errors.iter().enumerate() {
                    if index > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Parse(source) => Some(source),
            Self::Dataset(source) => Some(source),
            Self::Driver(source) => Some(source),
            Self::Cancelled | Self::Multiple(_) => None,
        }
    }
}

impl From<ParseError> for Error {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<DatasetError> for Error {
    fn from(value: DatasetError) -> Self {
        Self::Dataset(value)
    }
}

impl From<DriverError> for Error {
    fn from(value: DriverError) -> Self {
        Self::Driver(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_location(location: Option<&SourceLocation>) -> String {
    match location {
        Some(SourceLocation { line, column }) => match column {
            Some(column) => format!("{line}:{column}"),
            None => line.to_string(),
        },
        None => "unknown".to_string(),
    }
}
