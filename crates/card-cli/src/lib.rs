//! cardmatch command-line library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (build-index, identify, batch)

pub mod cli;
pub mod commands;

pub use cli::{BatchArgs, BuildIndexArgs, Cli, Commands, IdentifyArgs};
pub use commands::{
    build_index, identify, init_logging, load_settings, run_batch, shutdown_token,
};
