//! Output formatting for command results.

use crate::error::CliError;
use clap::ValueEnum;
use serde_json::json;
use sqldict_core::{Database, SyncReport};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Format the changes of a sync pass.
pub fn format_report(report: &SyncReport, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text if report.is_unchanged() => Ok("No changes.".to_string()),
        OutputFormat::Text => Ok(format!(
            "Tables: +{} ~{} -{}\nFields: +{} ~{} -{}\nConstraints: +{} ~{} -{}",
            report.tables_added,
            report.tables_updated,
            report.tables_removed,
            report.fields_added,
            report.fields_updated,
            report.fields_removed,
            report.constraints_added,
            report.constraints_updated,
            report.constraints_removed,
        )),
    }
}

/// Format the activation state of every constraint.
pub fn format_activation(db: &Database, format: OutputFormat) -> Result<String, CliError> {
    let rows: Vec<_> = db
        .constraints()
        .map(|c| {
            let table = db.table(c.table()).map(|t| t.name()).unwrap_or("?");
            let pending: Vec<&str> = c.deferred_refs().into_iter().map(|r| r.target()).collect();
            (c, table, pending)
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let items: Vec<_> = rows
                .iter()
                .map(|(c, table, pending)| {
                    json!({
                        "type": c.kind().code(),
                        "table": table,
                        "name": c.name,
                        "active": c.is_active(),
                        "unresolved": pending,
                    })
                })
                .collect();
            Ok(serde_json::to_string_pretty(&items)?)
        }
        OutputFormat::Text => {
            let mut lines = Vec::with_capacity(rows.len());
            for (c, table, pending) in &rows {
                let state = if c.is_active() { "active" } else { "INACTIVE" };
                let mut line = format!("{:<8} {} {}", state, c.kind().code(), table);
                if let Some(name) = &c.name {
                    line.push_str(&format!(" ({})", name));
                }
                if !pending.is_empty() {
                    line.push_str(&format!(" waiting for {}", pending.join(", ")));
                }
                lines.push(line);
            }
            Ok(lines.join("\n"))
        }
    }
}
