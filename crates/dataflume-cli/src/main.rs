mod input;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use dataflume_pipeline::{
    MemoryPublisher, MemorySourceProvider, MemoryStorage, Pipeline, PipelineConfig, PipelineError,
    ProcessOptions,
};
use dataflume_quality::Checker;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("input error: {0}")]
    Input(#[from] input::InputError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

#[derive(Parser, Debug)]
#[command(name = "dataflume", version, about = "Dataflume data-integration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run records through the ad-hoc validate/quality path.
    Process(ProcessArgs),
    /// Profile a record set without validating it.
    Profile(ProfileArgs),
    /// Detect quality issues and print recommendations.
    Issues(ProfileArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Input file with records (.json array or .csv with headers).
    input: PathBuf,
    /// Optional pipeline config (TOML); defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Batch size override.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Run the validation stage.
    #[arg(long, default_value_t = true)]
    validate: bool,
    /// Run the quality-scoring stage.
    #[arg(long, default_value_t = true)]
    quality: bool,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Input file with records (.json array or .csv with headers).
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Process(args) => run_process(args).await,
        Command::Profile(args) => run_profile(args),
        Command::Issues(args) => run_issues(args),
    }
}

async fn run_process(args: ProcessArgs) -> Result<(), CliError> {
    let records = input::load_records(&args.input)?;
    tracing::info!(event = "records_loaded", count = records.len(), path = %args.input.display());

    let config = match &args.config {
        Some(path) => PipelineConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };

    let pipeline = Pipeline::new(
        config,
        Arc::new(MemorySourceProvider::new()),
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryPublisher::new()),
    )?;

    let timer = Instant::now();
    let report = pipeline
        .process_data(
            &records,
            ProcessOptions {
                batch_size: args.batch_size,
                validate: args.validate,
                quality_check: args.quality,
            },
        )
        .await?;

    tracing::info!(
        event = "processing_finished",
        records_processed = report.records_processed,
        records_failed = report.records_failed,
        duration_ms = timer.elapsed().as_millis() as u64,
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_profile(args: ProfileArgs) -> Result<(), CliError> {
    let records = input::load_records(&args.input)?;
    let profile = dataflume_validate::profile(&records);
    tracing::info!(
        event = "profile_finished",
        records = profile.total_records,
        fields = profile.total_fields,
    );
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn run_issues(args: ProfileArgs) -> Result<(), CliError> {
    let records = input::load_records(&args.input)?;
    let checker = Checker::default();
    let issues = checker.detect_issues(&records);
    let recommendations = checker.generate_recommendations(&issues);
    tracing::info!(event = "issues_detected", count = issues.len());
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "issues": issues,
            "recommendations": recommendations,
        }))?
    );
    Ok(())
}
