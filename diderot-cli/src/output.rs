//! Terminal output helpers.

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

pub fn success(message: impl AsRef<str>) {
    println!("{} {}", "✓".green().bold(), message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    println!("  {} {}", "!".yellow().bold(), message.as_ref().yellow());
}

/// Print `rows` as a rounded table, or `empty` when there are none.
pub fn table<T: Tabled>(rows: Vec<T>, empty: &str) {
    if rows.is_empty() {
        println!("{empty}");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

/// Placeholder for absent optional columns.
pub fn or_dash(value: Option<String>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or_else(|| "-".to_string())
}
