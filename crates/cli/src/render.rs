use std::{
    io::{self, Write},
    time::Instant,
};

use nu_ansi_term::Color;
use seedql::{
    AssertProgress, AssertStatus, DiffSink, FieldDiff, RowDiff, SeedProgress, SeedTask, Value,
};

pub(crate) fn seed_progress() -> SeedProgress<'static> {
    let mut started = Instant::now();
    Box::new(move |table, task, start, error| {
        let (verb, color) = match task {
            SeedTask::Truncate => ("truncating", Color::LightRed),
            SeedTask::Insert => ("importing", Color::LightBlue),
            SeedTask::Upsert => ("upserting", Color::LightBlue),
            SeedTask::Delete => ("deleting", Color::LightRed),
        };
        if start {
            started = Instant::now();
            print!(
                "{}: '{}' ...",
                color.paint(verb),
                Color::Blue.bold().paint(table.to_string())
            );
            let _ = io::stdout().flush();
        } else if let Some(error) = error {
            println!(
                " {}\n    {}",
                Color::Red.paint("NG"),
                Color::Red.paint(error.to_string())
            );
        } else {
            println!(
                " {} ({})",
                Color::Green.paint("OK"),
                Color::Yellow.paint(format_elapsed(&started))
            );
        }
    })
}

pub(crate) fn assert_progress() -> AssertProgress<'static> {
    let mut started = Instant::now();
    Box::new(move |table, strategy, start, error| {
        if start {
            started = Instant::now();
            print!(
                "{}: '{}' ...",
                Color::LightRed.paint("fetching data"),
                Color::Blue.bold().paint(table.to_string())
            );
            let _ = io::stdout().flush();
        } else if let Some(error) = error {
            println!(
                " {}\n    {}",
                Color::Red.paint("NG"),
                Color::Red.paint(error.to_string())
            );
        } else {
            println!(
                " {} ({}) (match: {})",
                Color::Green.paint("OK"),
                Color::Yellow.paint(format_elapsed(&started)),
                strategy
            );
        }
    })
}

/// Colorized expected/actual rendering of a table diff. Primary keys lead
/// each row underlined; mismatched values are highlighted and padded so both
/// lines stay column-aligned.
pub(crate) fn diff_printer(show_table_name: bool, quiet: bool) -> DiffSink<'static> {
    Box::new(move |result| {
        if show_table_name {
            println!("{}", Color::Blue.bold().paint(format!("Table: {}", result.name)));
        }
        if result.is_match() {
            if !quiet {
                println!(" {}", Color::Green.paint("OK"));
            }
            return;
        }

        println!("{}", Color::Green.paint("+ Expected"));
        println!("{}", Color::Red.paint("- Actual"));

        let key_count = result.primary_keys.len();
        for row in &result.rows {
            print_key_prefix(row, key_count);
            match row.status {
                AssertStatus::Match => {
                    println!("   {}", side_line(row, key_count, Side::Expect, None));
                }
                AssertStatus::OnlyOnExpect => {
                    println!(
                        "{} {}",
                        Color::Black.on(Color::Green).paint("+"),
                        side_line(row, key_count, Side::Expect, Some(Color::Green))
                    );
                }
                AssertStatus::OnlyOnActual => {
                    println!(
                        "{} {}",
                        Color::Black.on(Color::Red).paint("-"),
                        side_line(row, key_count, Side::Actual, Some(Color::Red))
                    );
                }
                _ => {
                    println!(
                        "{} {}",
                        Color::Black.on(Color::Green).paint("+"),
                        side_line(row, key_count, Side::Expect, Some(Color::Green))
                    );
                    println!(
                        "{} {}",
                        Color::Black.on(Color::Red).paint("-"),
                        side_line(row, key_count, Side::Actual, Some(Color::Red))
                    );
                }
            }
        }
        println!();
    })
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Expect,
    Actual,
}

fn print_key_prefix(row: &RowDiff, key_count: usize) {
    for (index, field) in row.fields.iter().take(key_count).enumerate() {
        let value = if row.status == AssertStatus::OnlyOnActual {
            &field.actual
        } else {
            &field.expect
        };
        print!("{}", Color::Blue.bold().underline().paint(field.key.clone()));
        print!(
            "{}",
            Color::Blue.underline().paint(format!(": {}", render_value(value)))
        );
        if index + 1 == key_count {
            println!();
        } else {
            print!("{}", Color::Blue.underline().paint(", "));
        }
    }
}

fn side_line(row: &RowDiff, key_count: usize, side: Side, color: Option<Color>) -> String {
    let mut line = String::new();
    for (index, field) in row.fields.iter().enumerate().skip(key_count) {
        if index != key_count {
            line.push_str(&paint(color, ", "));
        }
        line.push_str(&render_field(field, side, color));
    }
    line
}

fn render_field(field: &FieldDiff, side: Side, color: Option<Color>) -> String {
    let (own, other) = match side {
        Side::Expect => (&field.expect, &field.actual),
        Side::Actual => (&field.actual, &field.expect),
    };
    let own_text = render_value(own);

    if field.status == AssertStatus::Match || color.is_none() {
        return paint(color, &format!("{}: {}", field.key, own_text));
    }

    // highlight the differing value and pad to the other side's width
    let other_text = render_value(other);
    let padding = " ".repeat(other_text.len().saturating_sub(own_text.len()));
    let highlight = match color {
        Some(Color::Green) => Color::Black.on(Color::Green),
        _ => Color::Black.on(Color::Red),
    };
    format!(
        "{}{}{}",
        paint(color, &format!("{}: ", field.key)),
        highlight.paint(own_text),
        padding
    )
}

fn paint(color: Option<Color>, text: &str) -> String {
    match color {
        Some(color) => color.paint(text.to_string()).to_string(),
        None => text.to_string(),
    }
}

fn render_value(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "null".to_string(),
    }
}

fn format_elapsed(started: &Instant) -> String {
    let elapsed = started.elapsed();
    if elapsed.as_millis() < 1 {
        format!("{}us", elapsed.as_micros())
    } else if elapsed.as_millis() < 1000 {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}
