//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Pretty-print any serializable value
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format bytes as a human-readable binary quantity
pub fn format_bytes(bytes: u64) -> String {
    const KI: u64 = 1024;
    const MI: u64 = KI * 1024;
    const GI: u64 = MI * 1024;

    if bytes >= GI {
        format!("{:.2}Gi", bytes as f64 / GI as f64)
    } else if bytes >= MI {
        format!("{:.2}Mi", bytes as f64 / MI as f64)
    } else if bytes >= KI {
        format!("{:.2}Ki", bytes as f64 / KI as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Whole cores print without a suffix, fractions in millicores
pub fn format_cpu(millicores: u64) -> String {
    if millicores % 1000 == 0 {
        format!("{}", millicores / 1000)
    } else {
        format!("{}m", millicores)
    }
}

pub fn format_price(price: f64) -> String {
    format!("${:.4}/h", price)
}

pub fn color_available(available: bool) -> String {
    if available {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}
