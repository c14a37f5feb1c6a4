//! Settle CLI: download and ingest exchange settlement files.
//!
//! Commands:
//! - `fetch`: download the day's settlement files into the local cache
//! - `ingest`: load cached files into a SQLite database or Parquet directory
//! - `run`: fetch, then ingest what was fetched
//! - `route`: print the market-data table a filename routes to

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use settle_core::config::IngestConfig;
use settle_core::pipeline::{cached_files, ingest_file, ingest_paths, IngestSummary, PipelineOptions};
use settle_core::progress::LogProgress;
use settle_core::routing::route_table_name;
use settle_core::storage::open_sink;
use settle_core::table::TableLayout;
use settle_core::transfer::{fetch_to_cache, select_current_files, FetchSummary, FtpClient, TransferClient};

#[derive(Parser)]
#[command(
    name = "settle",
    about = "Settle CLI: exchange settlement file ingestion"
)]
struct Cli {
    /// Path to a TOML config file. Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. info, debug, settle_core=trace). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download settlement files from the exchange FTP server.
    Fetch {
        #[command(flatten)]
        select: SelectArgs,
    },
    /// Ingest cached settlement files into storage.
    Ingest {
        #[command(flatten)]
        select: SelectArgs,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Fetch, then ingest the fetched files.
    Run {
        #[command(flatten)]
        select: SelectArgs,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print the table each filename routes to.
    Route {
        #[arg(required = true)]
        filenames: Vec<String>,
    },
}

#[derive(Args)]
struct SelectArgs {
    /// Business date token (YYYYMMDD). Defaults to today.
    #[arg(long)]
    date: Option<String>,

    /// A single file instead of every file of the date.
    #[arg(long)]
    filename: Option<String>,

    /// Local download cache. Defaults to the config value (./settle).
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Args)]
struct StoreArgs {
    /// Storage destination: sqlite://<path> or parquet://<dir>.
    #[arg(long)]
    uri: Option<String>,

    /// Market-data table layout: routed or single.
    #[arg(long)]
    layout: Option<TableLayout>,

    /// Parse threads for batch mode (0 = all cores).
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => IngestConfig::from_file(path)?,
        None => IngestConfig::default(),
    };
    let explicit_level = cli.log_level.is_some();
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if let Some(file) = cli.log_file {
        config.log.file = Some(file);
    }
    init_logging(&config, explicit_level)?;

    match cli.command {
        Commands::Fetch { select } => {
            prepare(&mut config, &select, None)?;
            let summary = run_fetch(&config, &select)?;
            exit_on_failures(summary.all_succeeded());
            Ok(())
        }
        Commands::Ingest { select, store } => {
            prepare(&mut config, &select, Some(&store))?;
            run_ingest(&config, &select)
        }
        Commands::Run { select, store } => {
            prepare(&mut config, &select, Some(&store))?;
            run_fetch_and_ingest(&config, &select)
        }
        Commands::Route { filenames } => {
            for name in &filenames {
                println!("{name}\t{}", route_table_name(name));
            }
            Ok(())
        }
    }
}

/// Install the global tracing subscriber.
///
/// Filter precedence: `--log-level` > `RUST_LOG` > config `log.level`.
fn init_logging(config: &IngestConfig, explicit: bool) -> Result<()> {
    let from_config = || {
        EnvFilter::try_new(&config.log.level)
            .with_context(|| format!("invalid log filter '{}'", config.log.level))
    };
    let filter = if explicit {
        from_config()?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => from_config()?,
        }
    };

    match &config.log.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Apply command flags over the loaded config, then validate the result.
fn prepare(config: &mut IngestConfig, select: &SelectArgs, store: Option<&StoreArgs>) -> Result<()> {
    apply_select(config, select);
    if let Some(store) = store {
        apply_store(config, store);
    }
    config.validate()?;
    Ok(())
}

fn apply_select(config: &mut IngestConfig, select: &SelectArgs) {
    if let Some(dir) = &select.cache_dir {
        config.cache_dir = dir.clone();
    }
}

fn apply_store(config: &mut IngestConfig, store: &StoreArgs) {
    if let Some(uri) = &store.uri {
        config.storage_uri = uri.clone();
    }
    if let Some(layout) = store.layout {
        config.layout = layout;
    }
    if let Some(workers) = store.workers {
        config.workers = workers;
    }
}

/// The `YYYYMMDD` token to select files by; today when not given.
fn date_token(date: Option<&str>) -> Result<String> {
    match date {
        Some(d) => {
            NaiveDate::parse_from_str(d, "%Y%m%d")
                .with_context(|| format!("--date must be YYYYMMDD, got '{d}'"))?;
            Ok(d.to_string())
        }
        None => Ok(chrono::Local::now().format("%Y%m%d").to_string()),
    }
}

fn run_fetch(config: &IngestConfig, select: &SelectArgs) -> Result<FetchSummary> {
    let mut client = FtpClient::connect(&config.remote)?;

    let names = match &select.filename {
        Some(name) => vec![name.clone()],
        None => {
            let token = date_token(select.date.as_deref())?;
            let listed = client.list_remote_files()?;
            let selected = select_current_files(&listed, &token, &config.suffix);
            info!(listed = listed.len(), selected = selected.len(), date = %token, "selected files");
            selected
        }
    };

    let summary = fetch_to_cache(&mut client, &config.cache_dir, &names, &LogProgress);
    for (name, err) in &summary.errors {
        eprintln!("Error for {name}: {err}");
    }
    if select.filename.is_some() {
        if let Some((_, err)) = summary.errors.first() {
            bail!("fetch failed: {err}");
        }
    }
    println!(
        "Fetched {}/{} files into {}",
        summary.fetched.len(),
        summary.total,
        config.cache_dir.display()
    );
    Ok(summary)
}

fn run_ingest(config: &IngestConfig, select: &SelectArgs) -> Result<()> {
    let mut sink = open_sink(&config.storage_uri)?;

    if let Some(name) = &select.filename {
        // Single-file mode: every error goes back to the caller.
        let path = resolve_cached(&config.cache_dir, name);
        let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let report = ingest_file(name, &bytes, config.layout, sink.as_mut())?;
        for (table, rows) in &report.tables {
            println!("{table}: {rows} rows");
        }
        if report.skipped_groups > 0 {
            println!("Skipped {} instrument groups", report.skipped_groups);
        }
        return Ok(());
    }

    let token = select.date.as_deref().map(|d| date_token(Some(d))).transpose()?;
    let paths = cached_files(&config.cache_dir, &config.suffix, token.as_deref())?;
    if paths.is_empty() {
        println!("No cached files in {}", config.cache_dir.display());
        return Ok(());
    }
    let summary = ingest_batch(config, &paths, sink.as_mut())?;
    exit_on_failures(summary.all_succeeded());
    Ok(())
}

fn run_fetch_and_ingest(config: &IngestConfig, select: &SelectArgs) -> Result<()> {
    let fetched = run_fetch(config, select)?;
    if fetched.fetched.is_empty() {
        exit_on_failures(fetched.all_succeeded());
        return Ok(());
    }

    let mut sink = open_sink(&config.storage_uri)?;
    let summary = ingest_batch(config, &fetched.fetched, sink.as_mut())?;
    exit_on_failures(fetched.all_succeeded() && summary.all_succeeded());
    Ok(())
}

fn ingest_batch(
    config: &IngestConfig,
    paths: &[PathBuf],
    sink: &mut dyn settle_core::StorageSink,
) -> Result<IngestSummary> {
    let options = PipelineOptions {
        layout: config.layout,
        workers: config.workers,
    };
    let summary = ingest_paths(paths, sink, options, &LogProgress)?;

    for err in &summary.errors {
        eprintln!("Error for {}: {}", err.filename, err.source);
    }
    println!(
        "Ingested {}/{} files, {} rows into {}",
        summary.succeeded, summary.total, summary.rows_written, config.storage_uri
    );
    Ok(summary)
}

/// A bare name is looked up in the cache; anything with a directory
/// component is taken as given.
fn resolve_cached(cache_dir: &Path, name: &str) -> PathBuf {
    let given = Path::new(name);
    if given.components().count() > 1 {
        given.to_path_buf()
    } else {
        cache_dir.join(name)
    }
}

/// Batch mode reports every failure first, then exits non-zero.
fn exit_on_failures(all_succeeded: bool) {
    if !all_succeeded {
        std::process::exit(1);
    }
}
