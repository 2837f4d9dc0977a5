//! VRP tracker CLI.
//!
//! ```bash
//! # Compute today's VRP snapshot and append it to the store
//! vrp-tracker run
//!
//! # Specific symbols, lookback and expiries
//! vrp-tracker run --symbol-index "NIFTY BANK" --symbol-option BANKNIFTY \
//!     --lookback-days 45 --expiry 2024-01-25 --expiry 2024-02-29
//!
//! # Browse stored snapshots
//! vrp-tracker view --symbol NIFTY --run-date 2024-01-19 --threshold 4
//!
//! # Create the database without running
//! vrp-tracker --db data/vrp.db init-db
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use vrp_tracker::config::AppConfig;
use vrp_tracker::data::NseClient;
use vrp_tracker::metrics::{ExpirySelection, MetricsEngine};
use vrp_tracker::pipeline::run_once;
use vrp_tracker::store::{CachedStore, SnapshotStore};
use vrp_tracker::viewer::{self, render, Selection, ViewState};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "vrp-tracker")]
#[command(about = "Track the volatility risk premium of index options")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute VRP for the next expiries and append to the store
    Run {
        /// Index name for price history
        #[arg(long)]
        symbol_index: Option<String>,

        /// Option symbol for chains
        #[arg(long)]
        symbol_option: Option<String>,

        /// Calendar days of price history
        #[arg(long)]
        lookback_days: Option<i64>,

        /// Expiry to evaluate (YYYY-MM-DD); repeat for several
        #[arg(long = "expiry")]
        expiries: Vec<NaiveDate>,

        /// Date the run is attributed to (YYYY-MM-DD, default today)
        #[arg(long)]
        run_date: Option<NaiveDate>,
    },

    /// Show stored snapshots
    View {
        /// Symbol to show (default: first stored)
        #[arg(long)]
        symbol: Option<String>,

        /// Run date to show (default: latest stored)
        #[arg(long)]
        run_date: Option<NaiveDate>,

        /// Minimum VRP-10D for the high-VRP table (0 to 10)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Create the vrp_data table if missing
    InitDb,
}

fn cmd_run(
    config: &AppConfig,
    symbol_index: Option<String>,
    symbol_option: Option<String>,
    lookback_days: Option<i64>,
    expiries: Vec<NaiveDate>,
    run_date: NaiveDate,
) -> Result<()> {
    let mut request = config.run_request(run_date);
    if let Some(symbol) = symbol_index {
        request.symbol_index = symbol;
    }
    if let Some(symbol) = symbol_option {
        request.symbol_option = symbol;
    }
    if let Some(days) = lookback_days {
        request.lookback_days = days;
    }
    if !expiries.is_empty() {
        request.expiries = ExpirySelection::Explicit(expiries);
    }

    let mut store = SnapshotStore::open_write(&config.store.db_path)
        .with_context(|| format!("Failed to open {}", config.store.db_path.display()))?;
    store.ensure_schema().context("Failed to create vrp_data")?;

    let client = NseClient::new(config.provider.clone()).context("Failed to build HTTP client")?;
    let engine = MetricsEngine::new(client, || Local::now().naive_local());

    let summary = run_once(&engine, &request, &mut store).context("VRP run failed")?;

    println!("{}", SEPARATOR);
    println!(
        "VRP run: {} on {} ({} rows appended, {} failed expiries)",
        request.symbol_option,
        request.run_date,
        summary.appended,
        summary.failed_expiries()
    );
    println!("{}", SEPARATOR);
    if !summary.records.is_empty() {
        print!("{}", render::records_table(&summary.records));
    }
    println!("  HTTP requests: {}", engine.provider().request_count());

    Ok(())
}

fn cmd_view(
    config: &AppConfig,
    symbol: Option<String>,
    run_date: Option<NaiveDate>,
    threshold: Option<f64>,
) -> Result<()> {
    let path = &config.store.db_path;
    if !path.exists() {
        println!("No data found in database.");
        return Ok(());
    }

    let store = SnapshotStore::open_read(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if !store.has_schema()? {
        println!("No data found in database.");
        return Ok(());
    }

    let mut cache = CachedStore::new(store, config.store.cache_ttl());
    let records = cache.load_all().context("Failed to load vrp_data")?;

    let threshold = threshold.unwrap_or(config.viewer.vrp_threshold);
    let Some(fallback) = viewer::default_selection(&records, threshold) else {
        println!("No data found in database.");
        return Ok(());
    };
    let selection = Selection::new(
        symbol.as_deref().unwrap_or(&fallback.symbol),
        run_date.unwrap_or(fallback.run_date),
        threshold,
    );

    println!("{}", SEPARATOR);
    println!("Symbols: {}", viewer::symbols(&records).join(", "));
    if let Some((first, last)) = viewer::run_date_bounds(&records) {
        println!("Run dates: {} to {}", first, last);
    }
    println!("{}", SEPARATOR);

    match viewer::build_dashboard(&records, selection) {
        ViewState::NoData => println!("No data found in database."),
        ViewState::Ready(dashboard) => print!("{}", render::render_dashboard(&dashboard)),
    }

    println!("\nAvailable data dates");
    print!(
        "{}",
        render::run_date_counts_table(&viewer::run_date_counts(&records))
    );

    Ok(())
}

fn cmd_init_db(config: &AppConfig) -> Result<()> {
    let store = SnapshotStore::open_write(&config.store.db_path)
        .with_context(|| format!("Failed to open {}", config.store.db_path.display()))?;
    store.ensure_schema().context("Failed to create vrp_data")?;
    println!(
        "vrp_data ready at {} ({} rows)",
        config.store.db_path.display(),
        store.row_count()?
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vrp_tracker=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(db) = cli.db {
        config.store.db_path = db;
    }

    match cli.command {
        Commands::Run {
            symbol_index,
            symbol_option,
            lookback_days,
            expiries,
            run_date,
        } => {
            let run_date = run_date.unwrap_or_else(|| Local::now().date_naive());
            cmd_run(
                &config,
                symbol_index,
                symbol_option,
                lookback_days,
                expiries,
                run_date,
            )?;
        }
        Commands::View {
            symbol,
            run_date,
            threshold,
        } => {
            cmd_view(&config, symbol, run_date, threshold)?;
        }
        Commands::InitDb => {
            cmd_init_db(&config)?;
        }
    }

    Ok(())
}
