// crates/driftwatch-cli/src/main.rs
//
// CLI entrypoint for the Driftwatch operator tools.
//
// Reads the daemon's registry and audit log in read-only mode, so it is
// safe to run next to a live daemon.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::audit::AuditCmd;
use commands::baseline::BaselineCmd;
use commands::production::ProductionCmd;
use commands::versions::VersionsCmd;
use commands::Context;
use output::OutputFormat;

/// Driftwatch CLI: inspect what the retraining controller has done.
#[derive(Parser, Debug)]
#[command(
    name = "driftwatch",
    version = "0.1.0",
    about = "Inspect Driftwatch model versions, baselines, and audit history"
)]
struct Cli {
    /// Data directory of the driftwatch-daemon.
    #[arg(long, global = true, default_value = "~/.driftwatch/data")]
    data_dir: String,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// List every registered version of a model.
    Versions(VersionsCmd),

    /// Show the production version of a model.
    Production(ProductionCmd),

    /// Show the drift baseline of a model.
    Baseline(BaselineCmd),

    /// Show recent audit records.
    Audit(AuditCmd),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let ctx = Context {
        data_dir: expand_tilde(&cli.data_dir),
        format: OutputFormat::from_flag(cli.json),
    };

    match &cli.command {
        Commands::Versions(cmd) => commands::versions::run(&ctx, cmd).await?,
        Commands::Production(cmd) => commands::production::run(&ctx, cmd).await?,
        Commands::Baseline(cmd) => commands::baseline::run(&ctx, cmd).await?,
        Commands::Audit(cmd) => commands::audit::run(&ctx, cmd).await?,
    }

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &path[1..]);
        }
    }
    path.to_string()
}
