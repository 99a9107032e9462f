use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ingest2parquet::config::{IngestConfig, LoggingConfig, StdEnvSource, DEFAULT_CONFIG_PATH};
use ingest2parquet::ddl::{self, BigQueryWarehouse, RunOptions};
use ingest2parquet::{validate_date, IngestOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

/// Extract PostgreSQL or CSV rows into partitioned Parquet on object storage
#[derive(Parser)]
#[command(name = "ingest2parquet")]
#[command(version)]
#[command(about = "Extract rows for an execution date into partitioned Parquet files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one execution date and write it as Parquet
    Ingest(IngestArgs),
    /// Execute BigQuery DDL files from a folder
    Ddl(DdlArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Execution date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    execution_date: String,

    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level: trace, debug, info, warn, error (overrides config file)
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[derive(Args)]
struct DdlArgs {
    /// Folder containing SQL files
    #[arg(long, value_name = "DIR", default_value = ddl::DEFAULT_SQL_FOLDER)]
    sql_folder: PathBuf,

    /// Google credentials JSON (service_account or authorized_user)
    #[arg(long, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// BigQuery project id
    #[arg(long, value_name = "ID")]
    project: Option<String>,

    /// File-name pattern to select SQL files
    #[arg(long, value_name = "GLOB", default_value = ddl::DEFAULT_PATTERN)]
    pattern: String,

    /// Specific files to run, relative to the SQL folder
    #[arg(long, value_name = "FILE", num_args = 1..)]
    files: Vec<String>,

    /// Validate statements without executing them
    #[arg(long)]
    dry_run: bool,

    /// Keep going after a failed file
    #[arg(long)]
    continue_on_error: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    match cli.command {
        Commands::Ingest(args) => runtime.block_on(run_ingest(args)),
        Commands::Ddl(args) => runtime.block_on(run_ddl(args)),
    }
}

async fn run_ingest(args: IngestArgs) -> Result<ExitCode> {
    // Step 1: Validate the date before touching config or sources
    let date = validate_date(&args.execution_date)?;

    // Step 2: Load configuration (file, then environment overrides)
    let mut config = IngestConfig::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Step 3: Apply CLI overrides (highest priority)
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    ingest2parquet::init_tracing(&config.logging);
    tracing::info!("ingest2parquet v{}", env!("CARGO_PKG_VERSION"));

    match ingest2parquet::run_ingestion(&config, &date).await? {
        IngestOutcome::Empty => tracing::info!("No data for {}; no file written", date),
        IngestOutcome::Written(file) => {
            tracing::info!("Output: {} ({} rows)", file.location, file.rows)
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_ddl(args: DdlArgs) -> Result<ExitCode> {
    ingest2parquet::init_tracing(&LoggingConfig {
        level: args.log_level.clone(),
        ..LoggingConfig::default()
    });

    let files = ddl::discover_sql_files(&args.sql_folder, &args.pattern, &args.files)?;

    let warehouse = BigQueryWarehouse::connect(
        args.credentials.as_deref(),
        args.project.as_deref(),
        &StdEnvSource,
    )
    .await?;

    let options = RunOptions {
        dry_run: args.dry_run,
        continue_on_error: args.continue_on_error,
    };
    let summary = ddl::run_ddl(&warehouse, &files, &options).await;

    Ok(ExitCode::from(summary.exit_code()))
}
