// Copyright 2026 Areascope Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use areascope::AcquisitionConfig;
use areascope_runtime::cli;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "areascope",
    about = "Areascope: per-location area data with source fallback and caching",
    version,
    after_help = "Run 'areascope <command> --help' for details on each command."
)]
struct Cli {
    /// Config file (default: ./areascope.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire feature records for location keys
    Acquire {
        /// Postcodes or districts (e.g. "SW1A 1AA", "UB5")
        #[arg(required = true)]
        keys: Vec<String>,
        /// Keys processed in parallel
        #[arg(long, default_value = "4")]
        concurrency: usize,
        /// Skip the geocoding concept
        #[arg(long)]
        no_geocode: bool,
        /// Also count nearby universities, hospitals and businesses
        #[arg(long)]
        places: bool,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// Manage the on-disk cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Entry counts per category
    Stats,
    /// Clear cached entries (all or for one category)
    Clear {
        /// Category to clear (omit to clear all)
        category: Option<String>,
    },
    /// Remove one entry
    Invalidate { category: String, key: String },
    /// Print one entry's payload
    Get { category: String, key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("AREASCOPE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("AREASCOPE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("AREASCOPE_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("AREASCOPE_NO_COLOR", "1");
    }

    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "areascope", &mut std::io::stdout());
        return Ok(());
    }

    cli::init_logging(cli.verbose, cli.log_json)?;
    let config =
        AcquisitionConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Acquire {
            keys,
            concurrency,
            no_geocode,
            places,
            headed,
        } => {
            let options = cli::acquire_cmd::AcquireOptions {
                concurrency,
                geocode: !no_geocode,
                places,
                headed,
            };
            cli::acquire_cmd::run(&config, &keys, options).await
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => cli::cache_cmd::run_stats(&config).await,
            CacheAction::Clear { category } => {
                cli::cache_cmd::run_clear(&config, category.as_deref()).await
            }
            CacheAction::Invalidate { category, key } => {
                cli::cache_cmd::run_invalidate(&config, &category, &key).await
            }
            CacheAction::Get { category, key } => {
                cli::cache_cmd::run_get(&config, &category, &key).await
            }
        },
        Commands::Doctor => cli::doctor::run(&config).await,
        Commands::Completions { .. } => Ok(()),
    }
}
