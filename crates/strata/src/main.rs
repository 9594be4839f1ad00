// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strata command-line interface.
//!
//! Runs SQL against the configured database through the connection
//! scheduler, or checks that the database opens and closes cleanly.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod exec;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use strata_config::StrataConfig;
use tracing::error;

/// Strata - serialized asynchronous access to a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "strata", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `database.path`.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute SQL statements in order and print result rows.
    Exec {
        /// One statement per argument.
        #[arg(required = true)]
        sql: Vec<String>,
    },
    /// Open, query and close the database, reporting each step.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => strata_config::load_and_validate_path(path),
        None => strata_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => apply_overrides(config, &cli),
        Err(errors) => {
            strata_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level);

    let result = match cli.command {
        Commands::Exec { sql } => exec::run_exec(&config.database, sql).await,
        Commands::Check { plain } => check::run_check(&config.database, plain).await,
    };

    if let Err(e) = result {
        error!(error = %e, code = e.code(), "command failed");
        eprintln!("strata: {e}");
        std::process::exit(1);
    }
}

fn apply_overrides(mut config: StrataConfig, cli: &Cli) -> StrataConfig {
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    config
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("strata={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
