//! SQL text builders for the MySQL dialect. Parameters use `?` placeholders.

/// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?);`
pub fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {};",
        table,
        columns.join(", "),
        question_placeholders(columns.len(), rows)
    )
}

/// Insert-or-update on duplicate key; non-key columns take the proposed
/// values via `VALUES(col)`.
pub fn upsert_sql(table: &str, columns: &[String], primary_keys: &[String], rows: usize) -> String {
    let assigns: Vec<String> = columns
        .iter()
        .filter(|column| !primary_keys.contains(column))
        .map(|column| format!("{column} = VALUES({column})"))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {};",
        table,
        columns.join(", "),
        question_placeholders(columns.len(), rows),
        assigns.join(", ")
    )
}

/// Single-column keys use `col IN (?, ?)`; composite keys use a
/// row-constructor list `(a, b) IN ((?, ?), (?, ?))`.
pub fn delete_sql(table: &str, columns: &[String], rows: usize) -> String {
    if columns.len() > 1 {
        format!(
            "DELETE FROM {} WHERE ({}) IN ({});",
            table,
            columns.join(", "),
            question_placeholders(columns.len(), rows)
        )
    } else {
        let placeholders = vec!["?"; rows].join(", ");
        format!(
            "DELETE FROM {} WHERE {} IN ({});",
            table, columns[0], placeholders
        )
    }
}

pub fn truncate_sql(table: &str) -> String {
    format!("TRUNCATE TABLE {table};")
}

fn question_placeholders(columns: usize, rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}
