// crates/driftwatch-cli/src/commands/production.rs
//
// `driftwatch production --model <name>`: the version currently serving.

use clap::Args;

use driftwatch_core::Registry;

use super::versions::format_metrics;
use super::Context;
use crate::output::{format_json, format_optional_time, format_time, OutputFormat};

#[derive(Debug, Args)]
pub struct ProductionCmd {
    /// Monitored model name.
    #[arg(long)]
    pub model: String,
}

/// Run the production command.
pub async fn run(ctx: &Context, cmd: &ProductionCmd) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ctx.registry()?;
    let production = registry.get_production(&cmd.model).await?;

    match (ctx.format, production) {
        (OutputFormat::Json, production) => println!("{}", format_json(&production)),
        (OutputFormat::Table, None) => println!("No production version for {}", cmd.model),
        (OutputFormat::Table, Some(v)) => {
            println!("Production version of {}", v.model);
            println!("-----------------------------");
            println!("  Version:   {}", v.version_id);
            println!("  Artifact:  {}", v.artifact_ref);
            println!("  Metrics:   {}", format_metrics(&v));
            println!("  Created:   {}", format_time(&v.created_at));
            println!("  Promoted:  {}", format_optional_time(&v.promoted_at));
            if let Some(job_id) = v.job_id {
                println!("  Job:       {}", job_id);
            }
        }
    }
    Ok(())
}
