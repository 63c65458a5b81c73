use std::collections::BTreeMap;

use seedql_core::{
    parse_dataset_str, seed, CancelToken, Error, Operation, SeedOptions, SeedTask,
};

#[path = "support/fake_driver.rs"]
mod fake_driver;

use fake_driver::{FakeDriver, BEGIN_SQL, COMMIT_SQL, ROLLBACK_SQL};

fn operations(pairs: &[(&str, Operation)]) -> BTreeMap<String, Operation> {
    pairs
        .iter()
        .map(|(table, operation)| (table.to_string(), *operation))
        .collect()
}

#[test]
fn default_operation_truncates_then_inserts_in_one_transaction() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
user:
- { id: 1, name: Frank }
- { id: 2, name: Grace }
",
    )
    .expect("parse dataset");

    seed(&CancelToken::new(), &mut driver, &data, SeedOptions::default()).expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "truncate user".to_string(),
            "insert user (id, name) values [1, Frank, 2, Grace]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn insert_operation_does_not_truncate() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str("user:\n- { id: 1, name: Frank }\n").expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Insert)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "insert user (id, name) values [1, Frank]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn dataset_operation_map_is_used_without_caller_overrides() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
_operation:
    user: insert
user:
- { id: 1, name: Frank }
",
    )
    .expect("parse dataset");

    seed(&CancelToken::new(), &mut driver, &data, SeedOptions::default()).expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "insert user (id, name) values [1, Frank]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn caller_overrides_win_over_dataset_operations() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
_operation:
    user: truncate
user:
- { id: 1, name: Frank }
",
    )
    .expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Insert)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "insert user (id, name) values [1, Frank]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn absent_columns_are_filled_with_null() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
user:
- { id: 1, name: Frank, email: frank@example.com }
- { id: 4, name: Ivan }
",
    )
    .expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Insert)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal()[1],
        "insert user (email, id, name) values [frank@example.com, 1, Frank, null, 4, Ivan]"
    );
}

#[test]
fn rows_are_written_in_batches_with_per_batch_column_unions() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
user:
- { id: 1, name: Frank }
- { id: 2, name: Grace }
- { id: 3, nickname: h }
- { id: 4, name: Ivan }
- { id: 5, name: John }
",
    )
    .expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            batch_size: 2,
            operations: operations(&[("user", Operation::Insert)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "insert user (id, name) values [1, Frank, 2, Grace]".to_string(),
            "insert user (id, name, nickname) values [3, null, h, 4, Ivan, null]".to_string(),
            "insert user (id, name) values [5, John]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn upsert_discovers_primary_keys_from_the_driver() {
    let mut driver = FakeDriver::default();
    driver.set_primary_keys("user", vec!["id"]);
    let data = parse_dataset_str("user:\n- { id: 5, name: Johnny }\n").expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Upsert)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "primary_keys user".to_string(),
            "upsert user (id, name) keys (id) values [5, Johnny]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn delete_projects_primary_key_tuples() {
    let mut driver = FakeDriver::default();
    driver.set_primary_keys("user", vec!["id"]);
    let data = parse_dataset_str("user:\n- { id: 5 }\n- { id: 7 }\n").expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Delete)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "primary_keys user".to_string(),
            "delete user (id) values [5, 7]".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn truncate_operation_skips_the_data_phase() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str("user:\n- { id: 1 }\n").expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Truncate)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![
            BEGIN_SQL.to_string(),
            "truncate user".to_string(),
            COMMIT_SQL.to_string(),
        ]
    );
}

#[test]
fn override_only_tables_are_truncated_without_a_body() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str("user:\n- { id: 1 }\n").expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("accesslog", Operation::Truncate)]),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    let journal = driver.journal();
    assert!(journal.contains(&"truncate accesslog".to_string()));
    assert!(journal.contains(&"truncate user".to_string()));
}

#[test]
fn truncate_phase_completes_before_any_data_phase() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
first:
- { id: 1 }
second:
- { id: 1 }
",
    )
    .expect("parse dataset");

    seed(&CancelToken::new(), &mut driver, &data, SeedOptions::default()).expect("seed");

    let journal = driver.journal();
    let last_truncate = journal
        .iter()
        .rposition(|line| line.starts_with("truncate"))
        .expect("truncate lines");
    let first_insert = journal
        .iter()
        .position(|line| line.starts_with("insert"))
        .expect("insert lines");
    assert!(last_truncate < first_insert);
}

#[test]
fn target_tables_scope_planning_and_execution() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
user:
- { id: 1 }
audit:
- { id: 1 }
",
    )
    .expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            target_tables: vec!["user".to_string()],
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    let journal = driver.journal();
    assert!(journal.iter().all(|line| !line.contains("audit")));
    assert!(journal.contains(&"truncate user".to_string()));
}

#[test]
fn tag_filters_drop_rows_but_keep_their_columns_in_the_union() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
user:
- { id: 1, name: Frank }
- { id: 2, extra: x, _tag: skip }
",
    )
    .expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Insert)]),
            exclude_tags: vec!["skip".to_string()],
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal()[1],
        "insert user (extra, id, name) values [null, 1, Frank]"
    );
}

#[test]
fn batches_left_empty_by_the_tag_filter_are_skipped() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str(
        "
user:
- { id: 1, _tag: skip }
- { id: 2, _tag: skip }
",
    )
    .expect("parse dataset");

    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            operations: operations(&[("user", Operation::Insert)]),
            exclude_tags: vec!["skip".to_string()],
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        driver.journal(),
        vec![BEGIN_SQL.to_string(), COMMIT_SQL.to_string()]
    );
}

#[test]
fn statement_failure_rolls_the_transaction_back() {
    let mut driver = FakeDriver::default();
    driver.fail_on("insert user", "boom");
    let data = parse_dataset_str("user:\n- { id: 1 }\n").expect("parse dataset");

    let error = seed(&CancelToken::new(), &mut driver, &data, SeedOptions::default())
        .expect_err("insert fails");
    assert!(error.to_string().contains("statement failed"));

    let journal = driver.journal();
    assert_eq!(journal.last(), Some(&ROLLBACK_SQL.to_string()));
    assert!(!journal.contains(&COMMIT_SQL.to_string()));
}

#[test]
fn progress_callback_fires_around_each_operation() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str("user:\n- { id: 1 }\n").expect("parse dataset");

    let mut events: Vec<(String, SeedTask, bool, bool)> = Vec::new();
    seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            progress: Some(Box::new(|table, task, start, error| {
                events.push((table.to_string(), task, start, error.is_some()));
            })),
            ..SeedOptions::default()
        },
    )
    .expect("seed");

    assert_eq!(
        events,
        vec![
            ("user".to_string(), SeedTask::Truncate, true, false),
            ("user".to_string(), SeedTask::Truncate, false, false),
            ("user".to_string(), SeedTask::Insert, true, false),
            ("user".to_string(), SeedTask::Insert, false, false),
        ]
    );
}

#[test]
fn progress_callback_carries_the_error_on_failure() {
    let mut driver = FakeDriver::default();
    driver.fail_on("insert user", "boom");
    let data = parse_dataset_str("user:\n- { id: 1 }\n").expect("parse dataset");

    let mut failures: Vec<(SeedTask, bool)> = Vec::new();
    let result = seed(
        &CancelToken::new(),
        &mut driver,
        &data,
        SeedOptions {
            progress: Some(Box::new(|_table, task, start, error| {
                if !start {
                    failures.push((task, error.is_some()));
                }
            })),
            ..SeedOptions::default()
        },
    );

    assert!(result.is_err());
    assert_eq!(
        failures,
        vec![(SeedTask::Truncate, false), (SeedTask::Insert, true)]
    );
}

#[test]
fn cancelled_token_stops_before_any_statement() {
    let mut driver = FakeDriver::default();
    let data = parse_dataset_str("user:\n- { id: 1 }\n").expect("parse dataset");

    let token = CancelToken::new();
    token.cancel();

    let error = seed(&token, &mut driver, &data, SeedOptions::default()).expect_err("cancelled");
    assert!(matches!(error, Error::Cancelled));
    assert!(driver.journal().is_empty());
}
