// crates/driftwatch-cli/src/commands/baseline.rs
//
// `driftwatch baseline --model <name>`: the reference distribution drift is
// measured against.

use clap::Args;
use tabled::Tabled;

use driftwatch_core::{Baseline, Registry};

use super::Context;
use crate::output::{format_json, format_table, format_time, OutputFormat};

#[derive(Debug, Args)]
pub struct BaselineCmd {
    /// Monitored model name.
    #[arg(long)]
    pub model: String,
}

/// One feature of the baseline.
#[derive(Tabled)]
pub struct FeatureRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Samples")]
    count: usize,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
    #[tabled(rename = "Bins")]
    bins: usize,
}

pub fn feature_rows(baseline: &Baseline) -> Vec<FeatureRow> {
    baseline
        .features
        .iter()
        .map(|(id, hist)| FeatureRow {
            feature: id.clone(),
            count: hist.count,
            mean: format!("{:.4}", hist.mean),
            std_dev: format!("{:.4}", hist.std_dev),
            bins: hist.proportions.len(),
        })
        .collect()
}

/// Run the baseline command.
pub async fn run(ctx: &Context, cmd: &BaselineCmd) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ctx.registry()?;
    let baseline = registry.baseline(&cmd.model).await?;

    match (ctx.format, baseline) {
        (OutputFormat::Json, baseline) => println!("{}", format_json(&baseline)),
        (OutputFormat::Table, None) => println!("No baseline recorded for {}", cmd.model),
        (OutputFormat::Table, Some(b)) => {
            println!("Baseline of {}", b.model);
            println!("  Built:        {}", format_time(&b.created_at));
            println!("  From window:  {}", b.source_window);
            println!("  Fingerprint:  {}", b.fingerprint());
            println!();
            println!("{}", format_table(&feature_rows(&b)));
        }
    }
    Ok(())
}
