//! CLI command implementations.

pub mod config;
pub mod explain;
pub mod simulate;

use clap::{Args, Subcommand};

/// Arguments for the explain command.
#[derive(Args)]
pub struct ExplainArgs {
    /// Cache-Control value as sent by the origin.
    pub cache_control: String,

    /// Evaluate expiries at this epoch time in milliseconds (default: now).
    #[arg(long)]
    pub now: Option<u64>,
}

/// Arguments for the simulate command.
#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file (TOML).
    pub scenario: String,

    /// Keep bookkeeping headers on served responses.
    #[arg(long)]
    pub debug: bool,

    /// Print served bodies.
    #[arg(long)]
    pub bodies: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}
