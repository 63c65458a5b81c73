use seedql_dialect_mysql::statements;

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn insert_uses_question_placeholders_per_row() {
    let sql = statements::insert_sql("member", &columns(&["email", "id", "name"]), 2);
    assert_eq!(
        sql,
        "INSERT INTO member (email, id, name) VALUES (?, ?, ?), (?, ?, ?);"
    );
}

#[test]
fn upsert_uses_on_duplicate_key_update() {
    let sql = statements::upsert_sql(
        "member",
        &columns(&["email", "id", "name"]),
        &columns(&["id"]),
        1,
    );
    assert_eq!(
        sql,
        "INSERT INTO member (email, id, name) VALUES (?, ?, ?) \
         ON DUPLICATE KEY UPDATE email = VALUES(email), name = VALUES(name);"
    );
}

#[test]
fn delete_with_single_key_uses_a_flat_in_list() {
    let sql = statements::delete_sql("member", &columns(&["id"]), 2);
    assert_eq!(sql, "DELETE FROM member WHERE id IN (?, ?);");
}

#[test]
fn delete_with_composite_key_uses_row_constructors() {
    let sql = statements::delete_sql("grade", &columns(&["class", "term"]), 2);
    assert_eq!(
        sql,
        "DELETE FROM grade WHERE (class, term) IN ((?, ?), (?, ?));"
    );
}

#[test]
fn truncate_uses_truncate_table() {
    assert_eq!(statements::truncate_sql("member"), "TRUNCATE TABLE member;");
}
