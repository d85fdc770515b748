//! Table rendering for store listings and query results

use rusqlite::types::Value;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::row::Row;
use crate::storage::TableStats;

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

pub fn stats_table(stats: &[TableStats]) -> String {
    if stats.is_empty() {
        return String::new();
    }

    let rows: Vec<StatsRow> = stats
        .iter()
        .map(|s| StatsRow {
            table: s.name.clone(),
            rows: s.rows,
        })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

/// Render result rows; the header comes from the first row's columns
pub fn rows_table(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let mut builder = Builder::default();
    builder.push_record(first.columns().map(str::to_string));
    for row in rows {
        builder.push_record(row.values().map(cell));
    }
    builder.build().with(Style::rounded()).to_string()
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Blob(v) => format!("<{} bytes>", v.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table() {
        let stats = vec![
            TableStats { name: "AUTHOR".into(), rows: 3 },
            TableStats { name: "BOOK".into(), rows: 12 },
        ];
        let table = stats_table(&stats);
        assert!(table.contains("Table"));
        assert!(table.contains("AUTHOR"));
        assert!(table.contains("12"));
        assert!(stats_table(&[]).is_empty());
    }

    #[test]
    fn test_rows_table() {
        let mut row = Row::new();
        row.set("ID", 1i64);
        row.set("NAME", "Ann".to_string());
        row.set("PHOTO", vec![1u8, 2, 3]);
        row.set("NOTE", Value::Null);

        let table = rows_table(&[row]);
        for expected in ["ID", "NAME", "Ann", "<3 bytes>", "NULL"] {
            assert!(table.contains(expected), "missing {}", expected);
        }
        assert!(rows_table(&[]).is_empty());
    }
}
