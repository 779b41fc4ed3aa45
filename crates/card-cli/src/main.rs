//! cardmatch
//!
//! Identify trading cards from photographs by nearest-neighbour search over
//! an index of reference card embeddings.
//!
//! # Usage
//!
//! ```bash
//! cardmatch build-index --catalog cards.csv [--ref-dir DIR] [--out FILE] [--limit N]
//! cardmatch identify --query photo.jpg [--index FILE] [--top-k K]
//! cardmatch batch [--query FILE | --query-dir DIR] [--results-root DIR] [--fail-fast]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/cardmatch/config.toml)
//! 3. `--config` file
//! 4. Environment variables (CARDMATCH_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use card_cli::{
    build_index, identify, init_logging, load_settings, run_batch, shutdown_token, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings.log_level);

    match cli.command {
        Commands::BuildIndex(args) => {
            build_index(settings, args, shutdown_token()).await?;
        }
        Commands::Identify(args) => {
            identify(settings, args).await?;
        }
        Commands::Batch(args) => {
            run_batch(settings, args, shutdown_token()).await?;
        }
    }

    Ok(())
}
