// crates/driftwatch-cli/src/commands/versions.rs
//
// `driftwatch versions --model <name>`: every registered version of a model.

use clap::Args;
use tabled::Tabled;

use driftwatch_core::{ModelVersion, Registry};

use super::Context;
use crate::output::{format_json, format_optional_time, format_table, format_time, OutputFormat};

#[derive(Debug, Args)]
pub struct VersionsCmd {
    /// Monitored model name.
    #[arg(long)]
    pub model: String,
}

/// A row in the versions table.
#[derive(Tabled)]
pub struct VersionRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Metrics")]
    metrics: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Promoted")]
    promoted: String,
    #[tabled(rename = "Archived")]
    archived: String,
    #[tabled(rename = "Artifact")]
    artifact: String,
}

impl From<&ModelVersion> for VersionRow {
    fn from(v: &ModelVersion) -> Self {
        let archived = match (&v.archived_at, &v.archive_reason) {
            (Some(at), Some(reason)) => format!("{} ({})", format_time(at), reason),
            _ => format_optional_time(&v.archived_at),
        };
        Self {
            id: v.version_id,
            stage: v.stage.to_string(),
            metrics: format_metrics(v),
            created: format_time(&v.created_at),
            promoted: format_optional_time(&v.promoted_at),
            archived,
            artifact: v.artifact_ref.clone(),
        }
    }
}

/// `name=value` pairs in name order.
pub fn format_metrics(v: &ModelVersion) -> String {
    v.metrics
        .iter()
        .map(|(name, value)| format!("{}={:.4}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run the versions command.
pub async fn run(ctx: &Context, cmd: &VersionsCmd) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ctx.registry()?;
    let versions = registry.list(&cmd.model).await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", format_json(&versions)),
        OutputFormat::Table => {
            if versions.is_empty() {
                println!("No versions registered for {}", cmd.model);
                return Ok(());
            }
            let rows: Vec<VersionRow> = versions.iter().map(VersionRow::from).collect();
            println!("{}", format_table(&rows));
        }
    }
    Ok(())
}
