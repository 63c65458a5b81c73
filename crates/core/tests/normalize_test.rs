use seedql_core::{parse_dataset_str, DatasetError, Error, Field, Value};

fn keys(row: &[Field]) -> Vec<&str> {
    row.iter().map(|field| field.key.as_str()).collect()
}

#[test]
fn primary_keys_come_first_then_alphabetical_columns() {
    let source = "
event:
- { zone: west, brand: acme, amount: 3, margin: 0.2 }
";
    let data = parse_dataset_str(source).expect("parse dataset");
    let normalized = data.tables[0]
        .sort_and_filter(&["zone".to_string(), "brand".to_string()], &[], &[])
        .expect("normalize");

    // pk columns sorted by name first, remaining columns sorted by name
    assert_eq!(keys(&normalized.rows[0]), vec!["brand", "zone", "amount", "margin"]);
}

#[test]
fn rows_sort_by_primary_key_prefix() {
    let source = "
score:
- { group: b, id: 2, points: 1 }
- { group: a, id: 9, points: 2 }
- { group: b, id: 1, points: 3 }
- { group: a, id: 3, points: 4 }
";
    let data = parse_dataset_str(source).expect("parse dataset");
    let normalized = data.tables[0]
        .sort_and_filter(&["group".to_string(), "id".to_string()], &[], &[])
        .expect("normalize");

    let prefixes: Vec<(String, i64)> = normalized
        .rows
        .iter()
        .map(|row| {
            let group = match &row[0].value {
                Value::Str(s) => s.clone(),
                other => panic!("unexpected group value: {other:?}"),
            };
            let id = match &row[1].value {
                Value::Int(i) => *i,
                other => panic!("unexpected id value: {other:?}"),
            };
            (group, id)
        })
        .collect();
    assert_eq!(
        prefixes,
        vec![
            ("a".to_string(), 3),
            ("a".to_string(), 9),
            ("b".to_string(), 1),
            ("b".to_string(), 2),
        ]
    );
}

#[test]
fn mixed_kind_keys_fall_back_to_textual_ordering() {
    let source = "
entry:
- { id: 10 }
- { id: '2' }
";
    let data = parse_dataset_str(source).expect("parse dataset");
    let normalized = data.tables[0]
        .sort_and_filter(&["id".to_string()], &[], &[])
        .expect("normalize");

    // "10" < "2" in the textual fallback
    assert_eq!(normalized.rows[0][0].value, Value::Int(10));
    assert_eq!(normalized.rows[1][0].value, Value::Str("2".to_string()));
}

#[test]
fn accumulates_all_rows_missing_primary_keys() {
    let source = "
user:
- { name: Frank }
- { id: 2, name: Grace }
- { name: Heidi }
";
    let data = parse_dataset_str(source).expect("parse dataset");
    let error = data.tables[0]
        .sort_and_filter(&["id".to_string()], &[], &[])
        .expect_err("two rows lack the id column");

    match error {
        Error::Dataset(DatasetError::MissingPrimaryKeys { table, rows }) => {
            assert_eq!(table, "user");
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].missing, vec!["id".to_string()]);
            assert!(rows[0].row.contains("Frank"));
            assert!(rows[1].row.contains("Heidi"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn exclude_tags_win_over_include_tags() {
    let source = "
user:
- { id: 1, _tag: 'a, b' }
- { id: 2, _tag: a }
- { id: 3 }
";
    let data = parse_dataset_str(source).expect("parse dataset");

    // row 1 carries both: the exclude on b rejects it even though a is included
    let normalized = data.tables[0]
        .sort_and_filter(&["id".to_string()], &["a".to_string()], &["b".to_string()])
        .expect("normalize");
    assert_eq!(normalized.rows.len(), 1);
    assert_eq!(normalized.rows[0][0].value, Value::Int(2));
}

#[test]
fn empty_include_set_accepts_untagged_rows() {
    let source = "
user:
- { id: 1, _tag: a }
- { id: 2 }
";
    let data = parse_dataset_str(source).expect("parse dataset");
    let normalized = data.tables[0]
        .sort_and_filter(&["id".to_string()], &[], &[])
        .expect("normalize");
    assert_eq!(normalized.rows.len(), 2);
}

#[test]
fn conjunctive_include_requires_every_tag() {
    let source = "
user:
- { id: 1, _tag: 'a, b' }
- { id: 2, _tag: a }
";
    let data = parse_dataset_str(source).expect("parse dataset");
    let normalized = data.tables[0]
        .sort_and_filter(
            &["id".to_string()],
            &["a".to_string(), "b".to_string()],
            &[],
        )
        .expect("normalize");
    assert_eq!(normalized.rows.len(), 1);
    assert_eq!(normalized.rows[0][0].value, Value::Int(1));
}
