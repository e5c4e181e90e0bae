//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use risk_lib::contract::{BatchItem, RiskLabel};
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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

/// Print field-level violations from an error body, or the raw details
pub fn print_details(details: &Value) {
    match details.get("errors").and_then(Value::as_array) {
        Some(errors) => {
            for error in errors {
                let field = error["field"].as_str().unwrap_or("?");
                let issue = error["issue"].as_str().unwrap_or("");
                eprintln!("  {} {}", field.bold(), issue);
            }
        }
        None => eprintln!("  {}", details),
    }
}

/// Format a probability as a percentage
pub fn format_probability(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

pub fn color_label(label: RiskLabel) -> String {
    match label {
        RiskLabel::Default => "high risk".red().bold().to_string(),
        RiskLabel::NonDefault => "low risk".green().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Row for batch and score result tables
#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "P(default)")]
    probability_default: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&BatchItem> for BatchRow {
    fn from(item: &BatchItem) -> Self {
        let error = match (&item.error, &item.details) {
            (Some(error), Some(details)) => match details.get("errors").and_then(Value::as_array) {
                Some(errors) => {
                    let fields: Vec<&str> = errors.iter().filter_map(|e| e["field"].as_str()).collect();
                    format!("{} ({})", error, fields.join(", "))
                }
                None => error.clone(),
            },
            (Some(error), None) => error.clone(),
            _ => String::new(),
        };

        Self {
            index: item.index,
            risk: item
                .prediction
                .map(|p| color_label(p.prediction))
                .unwrap_or_else(|| "-".to_string()),
            probability_default: item
                .prediction
                .map(|p| format_probability(p.probability_default))
                .unwrap_or_else(|| "-".to_string()),
            error,
        }
    }
}

/// Print per-application results followed by a summary line
pub fn print_batch(items: &[BatchItem], model_version: &str) {
    if items.is_empty() {
        print_warning("No applications scored");
        return;
    }

    let rows: Vec<BatchRow> = items.iter().map(BatchRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let failed = items.iter().filter(|i| !i.success).count();
    let high_risk = items
        .iter()
        .filter_map(|i| i.prediction)
        .filter(|p| p.prediction == RiskLabel::Default)
        .count();
    let summary = format!(
        "Scored {} of {} applications with model {}, {} high risk",
        items.len() - failed,
        items.len(),
        model_version,
        high_risk
    );
    if failed == 0 {
        print_success(&summary);
    } else {
        print_warning(&format!("{}, {} failed", summary, failed));
    }
}
