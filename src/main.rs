//! # Health Harness CLI (`hx`)
//!
//! The `hx` binary imports a health export into SQLite and reads it back.
//!
//! ## Usage
//!
//! ```bash
//! hx [--config ./config/hx.toml] [--db ./data/health.sqlite] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hx init` | Create an empty store stamped with the resolved timezone |
//! | `hx import <file>` | Replace the store with the contents of an export |
//! | `hx stats` | Row counts, date range and timezone of the store |
//! | `hx query <kind>` | Print a read accessor's result as JSON |
//!
//! ## Logging
//!
//! Logs go to stderr. The filter comes from `HX_LOG`, then `RUST_LOG`,
//! defaulting to `info`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use health_harness::config::{self, Config};
use health_harness::pipeline;
use health_harness::progress::ProgressMode;
use health_harness::query::{self, QueryKind};
use health_harness::schema;
use health_harness::stats;

/// Health Harness CLI: stream a health export into a query-ready SQLite store.
#[derive(Parser)]
#[command(
    name = "hx",
    about = "Health Harness — stream a health export into a query-ready SQLite store",
    version,
    long_about = "Health Harness reads a personal health export as a stream, keeps a fixed set of \
    metrics, workouts and sleep intervals, re-anchors every timestamp in one local timezone, and \
    writes raw rows plus per-day summaries into SQLite."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional. Without it built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store location; overrides `[db].path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create an empty store.
    ///
    /// Drops any existing tables and recreates the schema, then records the
    /// resolved timezone.
    Init {
        /// Local timezone as `UTC±H[:MM]`; defaults to the host timezone.
        #[arg(long, allow_hyphen_values = true)]
        utc_offset: Option<String>,
    },

    /// Import an export file.
    ///
    /// Every run is a full refresh: the store is rebuilt from this file alone.
    /// Nothing is changed if the import fails.
    Import {
        /// Path to the export XML.
        file: PathBuf,

        /// Local timezone as `UTC±H[:MM]`; defaults to the host timezone.
        #[arg(long, allow_hyphen_values = true)]
        utc_offset: Option<String>,

        /// Rows per multi-row INSERT.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show store statistics.
    Stats,

    /// Print a read accessor's result as JSON.
    Query {
        #[arg(value_enum)]
        kind: QueryKind,

        /// Days back from today (in the store's timezone).
        #[arg(long)]
        days: Option<u32>,

        /// Maximum rows for `workouts`.
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn init_logging() {
    let log_env = std::env::var("HX_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    // sqlx logs every statement at debug
    let combined_filter = format!("{},sqlx=warn", log_env);
    let env_filter = tracing_subscriber::EnvFilter::try_new(combined_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(db) = cli.db {
        cfg.db.path = db;
    }

    match cli.command {
        Commands::Init { utc_offset } => {
            if utc_offset.is_some() {
                cfg.import.utc_offset = utc_offset;
            }
            config::validate(&cfg)?;
            let setting = schema::run_init(&cfg).await?;
            println!(
                "Store initialized at {} (timezone {} {}).",
                cfg.db.path.display(),
                setting.name,
                setting.offset
            );
        }
        Commands::Import {
            file,
            utc_offset,
            batch_size,
            progress,
        } => {
            if utc_offset.is_some() {
                cfg.import.utc_offset = utc_offset;
            }
            if let Some(n) = batch_size {
                cfg.import.batch_size = n;
            }
            config::validate(&cfg)?;
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            pipeline::run_import(&cfg, &file, mode).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Query { kind, days, limit } => {
            query::run_query(&cfg, kind, days, limit).await?;
        }
    }

    Ok(())
}
