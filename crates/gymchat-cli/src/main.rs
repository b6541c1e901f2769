use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gymchat_cli::cli::{resolve_config, run_replay, Script};
use gymchat_core::tracing_setup::init_tracing_with_service;
use gymchat_core::Gym;

#[derive(Parser)]
#[command(name = "gymchat-cli")]
#[command(about = "Drive the gymchat recent-conversations core from the command line")]
struct Cli {
    /// Path to JSON core config (defaults to <config dir>/gymchat/config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON session script and print the conversation list as it changes
    Replay {
        /// Script file
        script: PathBuf,
        /// How often the owner loop drains the feeds, in milliseconds
        #[arg(long, default_value_t = 50)]
        tick_ms: u64,
    },

    /// List the selectable gyms and their ids
    Gyms,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing_with_service("gymchat-cli");
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { script, tick_ms } => {
            let config = resolve_config(cli.config.as_deref())?;
            let script = Script::load(&script)?;
            let report = run_replay(script, config, Duration::from_millis(tick_ms.max(1))).await?;
            println!(
                "done: {} conversation(s), {} list change(s), {} error(s)",
                report.final_ids.len(),
                report.list_changes,
                report.errors.len()
            );
        }
        Commands::Gyms => {
            for gym in Gym::ALL {
                println!("{}  {}", gym.id(), gym.name());
            }
        }
    }

    Ok(())
}
