use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use dmart_core::charts::ChartDataWriter;
use dmart_core::config::{DatabaseSettings, PipelineSettings};
use dmart_core::ingestion::{CsvSource, SqlSource};
use dmart_core::persistence::{CsvSink, SqlSink};
use dmart_core::pipelines::{Pipeline, RunReport};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_DIR: &str = "logs";

#[derive(Parser, Debug)]
#[command(author, version, about = "DMART retail sales ETL pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline against the configured database
    Run(RunArgs),
    /// Run the pipeline over a local CSV export without touching the database
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML file overriding the default pipeline settings
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// CSV file holding the raw sales table
    csv: PathBuf,
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write the cleaned table as CSV into this directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_tracing()?;

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Check(args) => check(args).await,
    };

    match outcome {
        Ok(report) => {
            info!(report = %summarize(&report), "Run summary");
            Ok(())
        }
        Err(err) => {
            error!(error = ?err, "DMART pipeline failed");
            Err(err)
        }
    }
}

/// Stderr output for operators plus a JSON log file per run.
fn init_tracing() -> Result<WorkerGuard> {
    std::fs::create_dir_all(LOG_DIR)
        .with_context(|| format!("failed to create log directory {}", LOG_DIR))?;
    let file_name = format!("dmart_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
    let file_appender = tracing_appender::rolling::never(LOG_DIR, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    Ok(guard)
}

fn load_settings(path: Option<&Path>) -> Result<PipelineSettings> {
    let settings = match path {
        Some(path) => PipelineSettings::from_toml_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => PipelineSettings::default(),
    };
    settings.check()?;
    Ok(settings)
}

async fn run(args: RunArgs) -> Result<RunReport> {
    let settings = load_settings(args.config.as_deref())?;
    let database = DatabaseSettings::from_env().context("database configuration is incomplete")?;
    let url = database.connection_url()?;
    info!(
        server = %database.host,
        database = %database.database,
        table = %database.table_name,
        "Database configuration loaded"
    );

    let source = SqlSource::new(url.clone(), database.table_name.clone());
    let sink = SqlSink::new(url, settings.post_write_procedure.clone());
    let renderer = ChartDataWriter::default();

    let pipeline = Pipeline::new(&settings, &source)
        .with_sink(&sink)
        .with_renderer(&renderer);
    Ok(pipeline.run().await?)
}

async fn check(args: CheckArgs) -> Result<RunReport> {
    let mut settings = load_settings(args.config.as_deref())?;
    let source = CsvSource::new(args.csv);
    let renderer = ChartDataWriter::default();

    let report = match args.output {
        Some(dir) => {
            let sink = CsvSink::new(dir);
            Pipeline::new(&settings, &source)
                .with_sink(&sink)
                .with_renderer(&renderer)
                .run()
                .await?
        }
        None => {
            settings.stages.persist_database = false;
            Pipeline::new(&settings, &source)
                .with_renderer(&renderer)
                .run()
                .await?
        }
    };
    Ok(report)
}

fn summarize(report: &RunReport) -> String {
    format!(
        "raw={} validated={} cleaned={} stages={:?} table={}",
        report.raw_rows,
        report.validated_rows,
        report.cleaned_rows,
        report.stages_completed,
        report.persisted_table.as_deref().unwrap_or("-"),
    )
}
