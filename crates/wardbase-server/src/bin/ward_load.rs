//! ward-load - load a local ward CSV file through the ingest pipeline

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::process;
use tracing::error;
use wardbase_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use wardbase_server::ingest::{
    config::{DEFAULT_BATCH_SIZE, DEFAULT_TABLE, DEFAULT_WORKERS},
    MalformedRowPolicy, PipelineConfig, PipelineCoordinator,
};

#[derive(Parser, Debug)]
#[command(name = "ward-load")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// CSV file to load; the first row is treated as a header
    file: PathBuf,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Rows per transaction
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Destination table
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Drop rows with the wrong field count instead of failing their batch
    #[arg(long)]
    skip_malformed: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("ward-load")
        .build();

    // Environment variables take precedence; CLI should work without logging
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _log_guard = init_logging(&log_config).ok();

    if let Err(e) = run(cli).await {
        error!(error = %e, "Load failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let malformed_rows = if cli.skip_malformed {
        MalformedRowPolicy::SkipRow
    } else {
        MalformedRowPolicy::FailBatch
    };

    let config = PipelineConfig::default()
        .with_workers(cli.workers)
        .with_batch_size(cli.batch_size)
        .with_table(cli.table)
        .with_malformed_rows(malformed_rows);

    let file = tokio::fs::File::open(&cli.file)
        .await
        .with_context(|| format!("Failed to open {}", cli.file.display()))?;

    // One connection per worker
    let pool = PgPoolOptions::new()
        .max_connections(config.workers as u32)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;

    let pipeline = PipelineCoordinator::postgres(pool.clone(), config)?;
    let summary = pipeline.run(file).await?;
    pool.close().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.batches_failed > 0 {
        anyhow::bail!(
            "{} of {} batches rolled back ({} rows)",
            summary.batches_failed,
            summary.batches_failed + summary.batches_committed,
            summary.rows_failed
        );
    }

    Ok(())
}
