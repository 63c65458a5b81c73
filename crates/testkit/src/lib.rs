//! Test helpers that drive a database from YAML datasets and fail the
//! enclosing test on any error or mismatch.
//!
//! ```no_run
//! use seedql::{AssertOptions, SeedOptions};
//!
//! seedql_testkit::seed_dataset(
//!     "sqlite://test.db",
//!     "testdata/initial.yaml",
//!     SeedOptions::default(),
//! );
//!
//! // ... run the code under test against the database ...
//!
//! seedql_testkit::assert_db(
//!     "sqlite://test.db",
//!     "testdata/expect.yaml",
//!     AssertOptions::default(),
//! );
//! ```

use std::{fs::File, path::Path};

use seedql::{
    assert_dataset, open_driver, parse_dataset, parse_dataset_str, seed, AssertOptions,
    CancelToken, DataSet, DbDriver, SeedOptions,
};

/// Seeds the database with the dataset file. Panics with context on any
/// parse, connection, or seed failure.
pub fn seed_dataset(conn: &str, dataset_path: impl AsRef<Path>, options: SeedOptions<'_>) {
    let path = dataset_path.as_ref();
    let data = load_dataset(path);
    seed_parsed(conn, &data, options, &path.display().to_string());
}

/// Seeds the database with an inline YAML dataset.
pub fn seed_dataset_str(conn: &str, yaml: &str, options: SeedOptions<'_>) {
    let data = parse_dataset_str(yaml)
        .unwrap_or_else(|error| panic!("failed to parse inline dataset: {error}"));
    seed_parsed(conn, &data, options, "<inline>");
}

/// Asserts the database against the dataset file. Panics with the rendered
/// diff on mismatch, and with context on any error.
pub fn assert_db(conn: &str, dataset_path: impl AsRef<Path>, options: AssertOptions<'_>) {
    let path = dataset_path.as_ref();
    let data = load_dataset(path);
    assert_parsed(conn, &data, options, &path.display().to_string());
}

/// Asserts the database against an inline YAML dataset.
pub fn assert_db_str(conn: &str, yaml: &str, options: AssertOptions<'_>) {
    let data = parse_dataset_str(yaml)
        .unwrap_or_else(|error| panic!("failed to parse inline dataset: {error}"));
    assert_parsed(conn, &data, options, "<inline>");
}

/// Strips the common leading indentation from an indented string literal, so
/// YAML documents can sit inside test source without fighting the YAML
/// indentation rules.
pub fn trim_indent(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut trimmed: Vec<&str> = lines
        .iter()
        .map(|line| if line.len() >= indent { &line[indent..] } else { line.trim_start() })
        .collect();
    while trimmed.first().is_some_and(|line| line.trim().is_empty()) {
        trimmed.remove(0);
    }
    while trimmed.last().is_some_and(|line| line.trim().is_empty()) {
        trimmed.pop();
    }
    let mut result = trimmed.join("\n");
    result.push('\n');
    result
}

fn load_dataset(path: &Path) -> DataSet {
    let file = File::open(path)
        .unwrap_or_else(|error| panic!("failed to open dataset {}: {error}", path.display()));
    parse_dataset(file)
        .unwrap_or_else(|error| panic!("failed to parse dataset {}: {error}", path.display()))
}

fn connect(conn: &str, label: &str) -> (CancelToken, Box<dyn DbDriver>) {
    let token = CancelToken::new();
    let driver = open_driver(&token, conn)
        .unwrap_or_else(|error| panic!("failed to open driver for {label}: {error}"));
    (token, driver)
}

fn seed_parsed(conn: &str, data: &DataSet, options: SeedOptions<'_>, label: &str) {
    let (token, mut driver) = connect(conn, label);
    seed(&token, driver.as_mut(), data, options)
        .unwrap_or_else(|error| panic!("failed to seed dataset {label}: {error}"));
}

fn assert_parsed(conn: &str, data: &DataSet, options: AssertOptions<'_>, label: &str) {
    let (token, driver) = connect(conn, label);
    let (ok, results) = assert_dataset(&token, driver.as_ref(), data, options)
        .unwrap_or_else(|error| panic!("failed to assert dataset {label}: {error}"));
    if !ok {
        let mut rendered = String::new();
        for result in &results {
            if !result.is_match() {
                rendered.push_str(&result.to_string());
            }
        }
        panic!("assertion failed for dataset {label}:\n{rendered}");
    }
}
