mod cmd;
mod output;
mod root;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "satromo",
    about = "Submit, track and publish satellite product exports",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from satromo.yaml)
    #[arg(long, global = true, env = "SATROMO_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check collection windows and submit exports for ready products
    Process {
        /// Run as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Submit even for products still marked RUNNING
        #[arg(long)]
        force: bool,
    },

    /// Merge and publish items whose partition exports all finished
    Publish,

    /// Show the product status table
    Status,

    /// Show in-flight export jobs grouped by item
    Jobs,

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Process { .. } | Commands::Publish => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Process { date, force } => cmd::process::run(&root, date, force, cli.json),
        Commands::Publish => cmd::publish::run(&root, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Jobs => cmd::jobs::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
