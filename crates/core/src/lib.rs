mod assert;
mod cancel;
mod dataset;
mod driver;
mod error;
mod normalize;
mod seed;
mod value;

pub use assert::{
    assert_dataset, AssertOptions, AssertProgress, AssertStatus, DiffSink, FieldDiff, RowDiff,
    TableAssertion,
};
pub use cancel::CancelToken;
pub use dataset::{
    parse_dataset, parse_dataset_str, DataSet, MatchStrategy, Operation, Row, Table, MATCH_KEY,
    OPERATION_KEY, TAG_KEY,
};
pub use driver::{DbDriver, Transaction};
pub use error::{
    DatasetError, DriverError, Error, MissingPrimaryKey, ParseError, Result, SourceLocation,
};
pub use normalize::{tag_filter, Field, NormalizedTable};
pub use seed::{seed, SeedOptions, SeedProgress, SeedTask, DEFAULT_BATCH_SIZE};
pub use value::{Placeholder, Value};
