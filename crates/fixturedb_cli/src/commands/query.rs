//! Query command implementation.

use fixturedb_sqlite::{ListenerClient, QueryRows};
use serde_json::Value;
use std::net::SocketAddr;

/// Runs the query command.
pub fn run(
    addr: SocketAddr,
    unit: &str,
    sql: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = ListenerClient::connect(addr)?;
    let rows = client.query(unit, sql)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            print!("{}", format_table(&rows));
            println!("({} row(s))", rows.len());
        }
    }

    Ok(())
}

fn format_table(rows: &QueryRows) -> String {
    let cells: Vec<Vec<String>> = rows
        .rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = rows.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |values: &[String]| -> String {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect();
        format!("{}\n", padded.join(" | ").trim_end())
    };

    let mut out = line(&rows.columns);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("{}\n", rule.join("-+-")));
    for row in &cells {
        out.push_str(&line(row));
    }
    out
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
