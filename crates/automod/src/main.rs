//! AutoModerator command line.
//!
//! - `check-config`: validate a policy snapshot
//! - `score`: query the prediction service for one revision
//! - `replay`: run recorded jobs through the job runner against a wiki fixture

use anyhow::{Context, Result};
use automod_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::config::{RunnerArgs, ScoringArgs, ServiceArgs};

#[derive(Parser, Debug)]
#[command(name = "automod", about = "AutoModerator revert decision service")]
struct Cli {
    /// Enable debug logging for the automod crates
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log to stderr only, without the rolling file under AUTOMOD_HOME
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a policy file and print the resolved policy
    CheckConfig {
        /// JSON policy snapshot
        policy: PathBuf,
    },

    /// Fetch the revert risk score of one revision
    Score {
        #[arg(long)]
        rev_id: u64,

        #[arg(long, env = "AUTOMOD_LANG", default_value = "en")]
        lang: String,

        /// Use the multilingual model instead of the language-agnostic one
        #[arg(long)]
        multilingual: bool,

        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Replay recorded jobs against an in-memory wiki
    Replay {
        /// Wiki fixture (JSON)
        #[arg(long)]
        wiki: PathBuf,

        /// One job descriptor per line
        #[arg(long)]
        jobs: PathBuf,

        /// JSON policy snapshot
        #[arg(long)]
        policy: PathBuf,

        /// Never contact the prediction service; every job must carry scores
        #[arg(long)]
        offline: bool,

        #[command(flatten)]
        service: ServiceArgs,

        #[command(flatten)]
        runner: RunnerArgs,

        #[command(flatten)]
        scoring: ScoringArgs,
    },
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::CheckConfig { policy } => cli::check_config::run(&policy),
        Commands::Score {
            rev_id,
            lang,
            multilingual,
            scoring,
        } => runtime()?.block_on(cli::score::run(rev_id, &lang, multilingual, &scoring)),
        Commands::Replay {
            wiki,
            jobs,
            policy,
            offline,
            service,
            runner,
            scoring,
        } => runtime()?.block_on(cli::replay::run(cli::replay::ReplayArgs {
            wiki,
            jobs,
            policy,
            offline,
            service,
            runner,
            scoring,
        })),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.no_log_file {
        LogConfig {
            app_name: "automod",
            verbose: cli.verbose,
            log_dir: None,
        }
    } else {
        LogConfig::with_default_dir("automod", cli.verbose)
    };
    if let Err(e) = init_logging(log_config) {
        eprintln!("Warning: logging setup failed: {:#}", e);
    }

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
