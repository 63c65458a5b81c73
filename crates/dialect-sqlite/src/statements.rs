//! SQL text builders for the SQLite dialect. Values always travel as `?`
//! parameters, so the builders never quote data.

/// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?)`
pub fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        question_placeholders(columns.len(), rows)
    )
}

/// Insert-or-update on primary-key conflict; non-key columns take the
/// proposed values via `excluded`.
pub fn upsert_sql(table: &str, columns: &[String], primary_keys: &[String], rows: usize) -> String {
    let assigns: Vec<String> = columns
        .iter()
        .filter(|column| !primary_keys.contains(column))
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT({}) DO UPDATE SET {};",
        table,
        columns.join(", "),
        question_placeholders(columns.len(), rows),
        primary_keys.join(", "),
        assigns.join(", ")
    )
}

/// Single-column keys use `col IN (?, ?)`; composite keys use a
/// row-constructor list `(a, b) IN ((?, ?), (?, ?))`.
pub fn delete_sql(table: &str, columns: &[String], rows: usize) -> String {
    if columns.len() > 1 {
        format!(
            "DELETE FROM {} WHERE ({}) IN ({})",
            table,
            columns.join(", "),
            question_placeholders(columns.len(), rows)
        )
    } else {
        let placeholders = vec!["?"; rows].join(", ");
        format!("DELETE FROM {} WHERE {} IN ({})", table, columns[0], placeholders)
    }
}

/// SQLite has no TRUNCATE primitive.
pub fn truncate_sql(table: &str) -> String {
    format!("DELETE FROM {table};")
}

fn question_placeholders(columns: usize, rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}
