// crates/driftwatch-cli/src/commands/audit.rs
//
// `driftwatch audit [--model <name>] [--limit N]`: the most recent audit
// records, oldest first.

use clap::Args;
use tabled::Tabled;

use driftwatch_core::AuditRecord;

use super::Context;
use crate::output::{format_json, format_table, format_time, OutputFormat};

#[derive(Debug, Args)]
pub struct AuditCmd {
    /// Only show records for this model.
    #[arg(long)]
    pub model: Option<String>,

    /// Number of records to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// A row in the audit table.
#[derive(Tabled)]
pub struct AuditRow {
    #[tabled(rename = "Seq")]
    seq: u64,
    #[tabled(rename = "Recorded")]
    recorded: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Event")]
    kind: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&AuditRecord> for AuditRow {
    fn from(r: &AuditRecord) -> Self {
        // The event JSON without its tag, which already has a column.
        let detail = match serde_json::to_value(&r.event) {
            Ok(serde_json::Value::Object(mut fields)) => {
                fields.remove("kind");
                serde_json::Value::Object(fields).to_string()
            }
            Ok(other) => other.to_string(),
            Err(e) => format!("<{}>", e),
        };
        Self {
            seq: r.seq,
            recorded: format_time(&r.recorded_at),
            model: r.model.clone(),
            kind: r.event.kind().to_string(),
            detail,
        }
    }
}

/// The last `limit` records, optionally restricted to one model.
pub fn select(records: Vec<AuditRecord>, model: Option<&str>, limit: usize) -> Vec<AuditRecord> {
    let mut matching: Vec<AuditRecord> = records
        .into_iter()
        .filter(|r| model.map_or(true, |m| r.model == m))
        .collect();
    let skip = matching.len().saturating_sub(limit);
    matching.drain(..skip);
    matching
}

/// Run the audit command.
pub async fn run(ctx: &Context, cmd: &AuditCmd) -> Result<(), Box<dyn std::error::Error>> {
    let log = ctx.audit_log()?;
    let records = match &cmd.model {
        Some(model) => select(log.read_all()?, Some(model), cmd.limit),
        None => log.read_recent(cmd.limit)?,
    };

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&records)),
        OutputFormat::Table => {
            if records.is_empty() {
                println!("No audit records");
                return Ok(());
            }
            let rows: Vec<AuditRow> = records.iter().map(AuditRow::from).collect();
            println!("{}", format_table(&rows));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use driftwatch_core::{AuditEvent, TriggerReason};

    fn record(seq: u64, model: &str) -> AuditRecord {
        AuditRecord {
            seq,
            recorded_at: DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            model: model.to_string(),
            event: AuditEvent::TriggerCoalesced {
                reason: TriggerReason::Manual { force: false },
                cause: "cooldown".to_string(),
            },
        }
    }

    #[test]
    fn select_keeps_the_latest_for_the_model() {
        let records = (1..=6)
            .map(|seq| record(seq, if seq % 2 == 0 { "churn" } else { "fraud" }))
            .collect();
        let picked = select(records, Some("churn"), 2);
        let seqs: Vec<u64> = picked.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![4, 6]);
    }

    #[test]
    fn row_detail_drops_the_tag() {
        let row = AuditRow::from(&record(3, "churn"));
        assert_eq!(row.kind, "trigger_coalesced");
        assert!(!row.detail.contains("\"kind\""));
        assert!(row.detail.contains("cooldown"));
    }
}
