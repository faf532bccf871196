//! mylove - command line access to the local record store
//!
//! Opens the database described by the configuration file and runs a single
//! store operation. Records go in and come out as JSON; logs go to stderr.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use mylove_config::load_config;
use mylove_store::{Database, DatabaseBuilder, Location};
use mylove_util::default_config_path;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use commands::Command;

/// mylove - inspect and edit the local record store
#[derive(Parser, Debug)]
#[command(name = "mylove")]
#[command(about = "Inspect and edit the mylove local record store", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/mylove/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set MYLOVE_DATA_DIR env var)
    #[arg(short, long, env = "MYLOVE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Use a throwaway in-memory database instead of the configured file
    #[arg(long)]
    in_memory: bool,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print operation timings to stderr when done
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn open_database(args: &Args) -> Result<Database> {
    let mut settings = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(data_dir) = &args.data_dir {
        settings.data_dir = data_dir.clone();
    }

    let mut builder = DatabaseBuilder::from_settings(&settings);
    if args.in_memory {
        builder = builder.location(Location::InMemory);
    }
    let db = builder.build().context("Invalid store definitions")?;

    info!(
        db = %settings.name,
        version = settings.version,
        location = ?db.location(),
        "Database configured"
    );
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);
    debug!(version = env!("CARGO_PKG_VERSION"), "mylove starting");

    let db = open_database(&args)?;
    let output = commands::run(&db, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.metrics {
        eprintln!("{}", db.metrics().report());
    }

    db.close();
    Ok(())
}
