//! qa-pilot - autonomous functional-test executor
//!
//! `qa-pilot` binary: parses flags, sets up logging and dispatches a subcommand.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use qa_pilot::cli::{commands, Command};
use qa_pilot::{Config, RunStatus};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// qa-pilot - drive a real browser with an LLM until a goal is verified
#[derive(Parser, Debug)]
#[command(name = "qa-pilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(level: &str, debug: bool) -> anyhow::Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    // stdout carries command output; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.debug)?;

    let mut config = match &args.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            Config::load_from_file(path)?
        }
        None => Config::load(),
    };

    if args.debug {
        config.agent.debug = true;
    }

    match args.command {
        Command::Run(run_args) => {
            let run = commands::run(config, &run_args).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
            if run.status != RunStatus::Completed {
                std::process::exit(1);
            }
        }
        Command::Cleanup => {
            let report = commands::cleanup(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Config { action } => {
            println!("{}", commands::config(&config, action)?);
        }
    }

    Ok(())
}
