//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print rows returned by a statement
pub fn print_rows(columns: &[String], rows: &[Vec<Value>], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                print_warning("No rows");
                return;
            }
            println!("{}", render_rows(columns, rows));
            println!("\n{} row(s)", rows.len());
        }
        OutputFormat::Json => {
            let objects: Vec<serde_json::Map<String, Value>> = rows
                .iter()
                .map(|row| columns.iter().cloned().zip(row.iter().cloned()).collect())
                .collect();
            if let Ok(json) = serde_json::to_string_pretty(&objects) {
                println!("{}", json);
            }
        }
    }
}

/// Render rows as a table with one column per result column
pub fn render_rows(columns: &[String], rows: &[Vec<Value>]) -> String {
    let mut builder = Builder::default();
    builder.push_record(columns.iter().cloned());
    for row in rows {
        builder.push_record(row.iter().map(format_cell));
    }
    builder.build().with(Style::rounded()).to_string()
}

/// Display form of a single value
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{:.4}", f)
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "generating" | "training" | "pending" | "running" => status.yellow().to_string(),
        "complete" | "succeeded" => status.green().to_string(),
        "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Format timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    // Try to parse and format nicely, otherwise return as-is
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_cell() {
        assert_eq!(format_cell(&Value::Null), "NULL");
        assert_eq!(format_cell(&json!("Manual")), "Manual");
        assert_eq!(format_cell(&json!(2017)), "2017");
        assert_eq!(format_cell(&json!(13250.5)), "13250.5");
        assert_eq!(format_cell(&json!(0.123456)), "0.1235");
        assert_eq!(format_cell(&json!(true)), "true");
    }

    #[test]
    fn test_render_rows_has_headers() {
        let rendered = render_rows(
            &["price".to_string(), "year".to_string()],
            &[vec![json!(12000.0), json!(2017)]],
        );
        assert!(rendered.contains("price"));
        assert!(rendered.contains("2017"));
        assert!(rendered.contains("12000"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp("2024-03-01T10:20:30.123+00:00"),
            "2024-03-01 10:20:30"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }
}
