use seedql_core::{CancelToken, DbDriver, Value};
use tempfile::tempdir;

const SCHEMA_SQL: &str = "
CREATE TABLE user (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT UNIQUE
);
CREATE TABLE grade (
    class TEXT NOT NULL,
    term INTEGER NOT NULL,
    score REAL,
    PRIMARY KEY (class, term)
);
";

fn open_scratch_driver(dir: &tempfile::TempDir) -> Box<dyn DbDriver> {
    let path = dir.path().join("scratch.db");
    let driver = seedql_dialect_sqlite::connect(
        path.to_str().expect("utf-8 temp path"),
        CancelToken::new(),
    )
    .expect("open sqlite database");
    driver.execute(SCHEMA_SQL).expect("create schema");
    driver
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn lists_base_tables_sorted() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);
    assert_eq!(
        driver.table_names(None).expect("table names"),
        vec!["grade".to_string(), "user".to_string()]
    );
}

#[test]
fn discovers_primary_keys_sorted_by_name() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);
    assert_eq!(
        driver.primary_keys("user").expect("user keys"),
        vec!["id".to_string()]
    );
    assert_eq!(
        driver.primary_keys("grade").expect("grade keys"),
        vec!["class".to_string(), "term".to_string()]
    );
}

#[test]
fn inserts_and_fetches_rows_with_kind_decoding() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);

    driver
        .insert(
            "user",
            &strings(&["email", "id", "name"]),
            &[
                Value::Str("frank@example.com".to_string()),
                Value::Int(1),
                Value::Str("Frank".to_string()),
                Value::Null,
                Value::Int(4),
                Value::Str("Ivan".to_string()),
            ],
        )
        .expect("insert rows");

    let rows = driver.fetch_rows("user").expect("fetch rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(
        rows[0].get("email"),
        Some(&Value::Str("frank@example.com".to_string()))
    );
    assert_eq!(rows[1].get("email"), Some(&Value::Null));
    assert_eq!(rows[1].get("name"), Some(&Value::Str("Ivan".to_string())));
}

#[test]
fn upsert_updates_non_key_columns_on_conflict() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);
    driver
        .execute("INSERT INTO user (id, name, email) VALUES (5, 'John', 'john@example.com');")
        .expect("pre-state");

    driver
        .upsert(
            "user",
            &strings(&["id", "name"]),
            &strings(&["id"]),
            &[Value::Int(5), Value::Str("Johnny".to_string())],
        )
        .expect("upsert");

    let rows = driver.fetch_rows("user").expect("fetch rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::Str("Johnny".to_string())));
    // email keeps the stored value because the statement never mentions it
    assert_eq!(
        rows[0].get("email"),
        Some(&Value::Str("john@example.com".to_string()))
    );
}

#[test]
fn delete_removes_matching_and_ignores_missing_keys() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);
    driver
        .execute("INSERT INTO user (id, name) VALUES (5, 'John'), (6, 'Kate');")
        .expect("pre-state");

    driver
        .delete("user", &strings(&["id"]), &[Value::Int(5), Value::Int(7)])
        .expect("delete");

    let rows = driver.fetch_rows("user").expect("fetch rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::Str("Kate".to_string())));
}

#[test]
fn delete_with_composite_key_matches_tuples() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);
    driver
        .execute(
            "INSERT INTO grade (class, term, score) VALUES
                ('math', 1, 80.5), ('math', 2, 91.0), ('art', 1, 70.0);",
        )
        .expect("pre-state");

    driver
        .delete(
            "grade",
            &strings(&["class", "term"]),
            &[
                Value::Str("math".to_string()),
                Value::Int(1),
                Value::Str("art".to_string()),
                Value::Int(1),
            ],
        )
        .expect("delete");

    let rows = driver.fetch_rows("grade").expect("fetch rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("term"), Some(&Value::Int(2)));
    assert_eq!(rows[0].get("score"), Some(&Value::Float(91.0)));
}

#[test]
fn truncate_empties_the_table() {
    let dir = tempdir().expect("tempdir");
    let driver = open_scratch_driver(&dir);
    driver
        .execute("INSERT INTO user (id, name) VALUES (5, 'John'), (6, 'Kate');")
        .expect("pre-state");

    driver.truncate("user").expect("truncate");
    assert!(driver.fetch_rows("user").expect("fetch rows").is_empty());
}

#[test]
fn dropped_transaction_rolls_back_writes() {
    let dir = tempdir().expect("tempdir");
    let mut driver = open_scratch_driver(&dir);

    {
        let mut tx = driver.begin().expect("begin");
        tx.insert(
            "user",
            &strings(&["id", "name"]),
            &[Value::Int(1), Value::Str("Frank".to_string())],
        )
        .expect("insert inside transaction");
        // dropped without commit
    }

    assert!(driver.fetch_rows("user").expect("fetch rows").is_empty());
}

#[test]
fn committed_transaction_keeps_writes() {
    let dir = tempdir().expect("tempdir");
    let mut driver = open_scratch_driver(&dir);

    {
        let mut tx = driver.begin().expect("begin");
        tx.insert(
            "user",
            &strings(&["id", "name"]),
            &[Value::Int(1), Value::Str("Frank".to_string())],
        )
        .expect("insert inside transaction");
        tx.commit().expect("commit");
    }

    assert_eq!(driver.fetch_rows("user").expect("fetch rows").len(), 1);
}

#[test]
fn cancelled_token_blocks_statements() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cancelled.db");
    let token = CancelToken::new();
    let driver = seedql_dialect_sqlite::connect(
        path.to_str().expect("utf-8 temp path"),
        token.clone(),
    )
    .expect("open sqlite database");

    token.cancel();
    let error = driver.table_names(None).expect_err("cancelled");
    assert!(matches!(error, seedql_core::Error::Cancelled));
}
