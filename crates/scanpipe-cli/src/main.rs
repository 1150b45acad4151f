//! scanpipe — scan a CSV file through a pull-based scan source.
//!
//! Drives a `ScanSource` the way a pipeline executor would and reports how
//! many chunks and rows came out, optionally with background reads and
//! Prometheus counters.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use arrow::array::RecordBatch;
use clap::{Parser, Subcommand};
use scanpipe_core::ReadSettings;
use scanpipe_readers::CsvFileReader;
use scanpipe_source::{drive_into, ScanMetrics, ScanSource, ScanSummary, Source};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "scanpipe", about = "Scan tables through a pull-based source")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a CSV file and report what the source produced
    Scan {
        /// Path to the CSV file (first line is the header)
        path: PathBuf,

        /// Offload each read to the background I/O pool
        #[arg(long = "async")]
        background: bool,

        /// Rows per chunk
        #[arg(long, env = "SCANPIPE_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// Worker threads for the background I/O pool
        #[arg(long, env = "SCANPIPE_IO_THREADS")]
        io_threads: Option<usize>,

        /// Print the first chunk as a table
        #[arg(long)]
        preview: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Print scan metrics in Prometheus text format
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .init();
    }

    match cli.command {
        Commands::Scan {
            path,
            background,
            batch_size,
            io_threads,
            preview,
            json,
            metrics,
        } => {
            let mut settings = ReadSettings::from_env()?;
            if background {
                settings = settings.with_async_read(true);
            }
            if let Some(batch_size) = batch_size {
                settings = settings.with_batch_size(batch_size);
            }
            if let Some(io_threads) = io_threads {
                settings.io_threads = io_threads;
            }
            run_scan(path, settings, preview, json, metrics).await?;
        }
    }

    Ok(())
}

async fn run_scan(
    path: PathBuf,
    settings: ReadSettings,
    preview: bool,
    json: bool,
    with_metrics: bool,
) -> anyhow::Result<()> {
    let reader = CsvFileReader::open(&path, settings)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let scan_metrics = ScanMetrics::new();
    let mut source = ScanSource::new(Arc::new(reader))?.with_metrics(scan_metrics.clone());
    info!(
        "Scanning {} ({} background reads)",
        path.display(),
        if source.is_async() { "with" } else { "without" }
    );

    let mut first: Option<RecordBatch> = None;
    let mut summary = ScanSummary::new(source.name());
    let interrupted = tokio::select! {
        result = drive_into(&mut source, |batch| {
            if preview && first.is_none() {
                first = Some(batch);
            }
        }, &mut summary) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        warn!("Interrupted, cancelling scan");
        source.cancel();
        // Let an in-flight background read finish before exiting.
        drive_into(&mut source, |_| {}, &mut summary).await?;
        summary.cancelled = true;
    }

    if let Some(batch) = &first {
        println!("{}", arrow::util::pretty::pretty_format_batches(std::slice::from_ref(batch))?);
    }

    if json {
        let report = serde_json::json!({
            "summary": summary,
            "progress": source.progress(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let progress = source.progress();
        println!("\n=== Scan Complete ===");
        println!("Source: {}", summary.source);
        println!("Chunks: {}", summary.chunks);
        println!("Rows: {}", summary.rows);
        println!("Read rows: {}", progress.read_rows);
        println!("Read bytes: {}", progress.read_bytes);
        println!("Background waits: {}", summary.async_waits);
        if summary.cancelled {
            println!("Cancelled: yes");
        }
    }

    if with_metrics {
        print!("{}", scan_metrics.encode());
    }

    Ok(())
}
