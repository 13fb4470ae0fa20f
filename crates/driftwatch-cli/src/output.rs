// crates/driftwatch-cli/src/output.rs
//
// Output formatting for the Driftwatch CLI: tables for people, JSON for
// scripts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed table output (default).
    Table,
    /// JSON output for machine consumption.
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        }
    }
}

/// Format a slice of Tabled items as a table string.
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).to_string()
}

/// Format a serializable value as a pretty-printed JSON string.
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {}", e))
}

/// Short UTC timestamp for table cells.
pub fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_optional_time(at: &Option<DateTime<Utc>>) -> String {
    at.as_ref().map(format_time).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled, Serialize)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
    }

    #[test]
    fn table_has_renamed_header() {
        let out = format_table(&[Row {
            name: "churn".to_string(),
        }]);
        assert!(out.contains("Name"));
        assert!(out.contains("churn"));
    }

    #[test]
    fn json_is_pretty() {
        let out = format_json(&Row {
            name: "churn".to_string(),
        });
        assert_eq!(out, "{\n  \"name\": \"churn\"\n}");
    }

    #[test]
    fn optional_time_placeholder() {
        assert_eq!(format_optional_time(&None), "-");
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_optional_time(&Some(at)), "2026-03-01 12:00:00");
    }
}
