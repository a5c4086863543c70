//! CLI module - command-line interface
//!
//! Subcommand definitions and their handlers.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute one test run against a live page
    Run(RunArgs),

    /// Kill orphaned browsers and purge stale temp files
    Cleanup,

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `run`. Flags override fields read from `--request`.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Page the run starts on
    #[arg(long)]
    pub url: Option<String>,

    /// Natural-language instructions for the agent
    #[arg(long)]
    pub instructions: Option<String>,

    /// Outcome that counts as success
    #[arg(long)]
    pub outcome: Option<String>,

    /// Test template id the run belongs to
    #[arg(long)]
    pub test_id: Option<String>,

    /// Read the request from a JSON file ({url, instructions, outcome, testId})
    #[arg(long)]
    pub request: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Override the step cap
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Override the oracle model
    #[arg(long, short = 'm')]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init,
    /// Print the configuration file path
    Path,
}
