//! CLI argument parsing for cardmatch.
//!
//! Flags override every other configuration source.

use clap::{Args, Parser, Subcommand};

/// cardmatch
///
/// Identify trading cards from photographs against an index of reference
/// card images.
#[derive(Parser, Debug)]
#[command(name = "cardmatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (in addition to ~/.config/cardmatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an embedding index from a card catalog
    BuildIndex(BuildIndexArgs),

    /// Identify a single query image
    Identify(IdentifyArgs),

    /// Identify one image or a directory of images and stage the results
    Batch(BatchArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildIndexArgs {
    /// Catalog file (.csv, .json, .jsonl)
    #[arg(long)]
    pub catalog: Option<String>,

    /// Reference image directory (downloads land here)
    #[arg(long)]
    pub ref_dir: Option<String>,

    /// Output index path
    #[arg(short, long)]
    pub out: Option<String>,

    /// Only index the first N catalog rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Records processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct IdentifyArgs {
    /// Query image
    #[arg(short, long)]
    pub query: String,

    /// Index path
    #[arg(short, long)]
    pub index: Option<String>,

    /// Number of matches to return
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BatchArgs {
    /// Single query image
    #[arg(short, long, conflicts_with = "query_dir")]
    pub query: Option<String>,

    /// Directory of query images (default from config)
    #[arg(long)]
    pub query_dir: Option<String>,

    /// Index path
    #[arg(short, long)]
    pub index: Option<String>,

    /// Reference image directory
    #[arg(long)]
    pub ref_dir: Option<String>,

    /// Parent directory for run directories
    #[arg(long)]
    pub results_root: Option<String>,

    /// Number of matches per query
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Queries processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Abort the batch on the first failed query
    #[arg(long)]
    pub fail_fast: bool,
}
