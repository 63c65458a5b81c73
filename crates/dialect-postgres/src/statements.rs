//! SQL text builders for the PostgreSQL dialect. Parameters use numbered
//! `$n` placeholders.

/// `INSERT INTO t (a, b) VALUES ($1, $2), ($3, $4)`
pub fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        dollar_placeholders(columns.len(), rows)
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
        dollar_placeholders(columns.len(), rows),
        primary_keys.join(", "),
        assigns.join(", ")
    )
}

/// Single-column keys use `col IN ($1, $2)`; composite keys use a
/// row-constructor list `(a, b) IN (($1, $2), ($3, $4))`.
pub fn delete_sql(table: &str, columns: &[String], rows: usize) -> String {
    if columns.len() > 1 {
        format!(
            "DELETE FROM {} WHERE ({}) IN ({})",
            table,
            columns.join(", "),
            dollar_placeholders(columns.len(), rows)
        )
    } else {
        let placeholders: Vec<String> = (1..=rows).map(|index| format!("${index}")).collect();
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            table,
            columns[0],
            placeholders.join(", ")
        )
    }
}

pub fn truncate_sql(table: &str) -> String {
    format!("TRUNCATE TABLE {table};")
}

fn dollar_placeholders(columns: usize, rows: usize) -> String {
    let mut counter = 1;
    let mut groups = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut group = Vec::with_capacity(columns);
        for _ in 0..columns {
            group.push(format!("${counter}"));
            counter += 1;
        }
        groups.push(format!("({})", group.join(", ")));
    }
    groups.join(", ")
}
