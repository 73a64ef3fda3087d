//! cellar CLI - notebooks whose cells are served from a cache.

mod clean;
mod colors;
mod progress;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cellar")]
#[command(about = "Run notebooks, replaying cells whose results are cached")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log filter (e.g. `info`, `cellar_core=debug`); overrides --verbose
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook
    Run(run::RunArgs),

    /// Remove every entry from the cache directory
    Clean {
        /// Cache directory (default: <temp dir>/cellar-cache)
        #[arg(long, env = "CELLAR_CACHE_DIR", value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None if cli.verbose => {
            EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
        }
        None => EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run::execute(&args)?,
        Commands::Clean { cache_dir } => clean::execute(cache_dir.as_deref())?,
    }

    Ok(())
}
