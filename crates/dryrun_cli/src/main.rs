//! dryrun CLI
//!
//! Predicts the output schema of every node in a compiled project by dry
//! running its SQL against the warehouse.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use dryrun_core::RunConfig;
use dryrun_plan::{Dag, Manifest, NodeFilter};
use dryrun_runtime::{ExecutionEngine, Report, ResultReporter, Scheduler};
use dryrun_warehouse::{BigQueryConfig, BigQueryWarehouse, RetryingWarehouse};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dryrun")]
#[command(about = "dryrun - Predict SQL model schemas without running them", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry run the project against the warehouse
    Run(RunArgs),
    /// Print the generations that would run, without touching the warehouse
    Plan(SelectArgs),
}

/// Which manifest and which part of it
#[derive(Args)]
struct SelectArgs {
    /// Path to the compiled manifest.json
    #[arg(long, default_value = "target/manifest.json", env = "DRYRUN_MANIFEST_PATH")]
    manifest_path: PathBuf,

    /// Only dry run this node and its upstream dependencies
    #[arg(long, conflicts_with = "tags")]
    model: Option<String>,

    /// Only dry run nodes with any of these tags, plus their upstreams
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
}

impl SelectArgs {
    fn filter(&self) -> NodeFilter {
        match (&self.model, self.tags.is_empty()) {
            (Some(model), _) => NodeFilter::Model(model.clone()),
            (None, false) => NodeFilter::Tags(self.tags.clone()),
            (None, true) => NodeFilter::All,
        }
    }

    fn manifest(&self) -> Result<Manifest> {
        Manifest::from_path(&self.manifest_path)
            .wrap_err_with(|| format!("Failed to load {}", self.manifest_path.display()))
    }
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    select: SelectArgs,

    /// Warehouse project to run dry run jobs in
    #[arg(long, env = "DRYRUN_PROJECT")]
    project: String,

    /// Warehouse location, e.g. `EU`
    #[arg(long, env = "DRYRUN_LOCATION")]
    location: Option<String>,

    /// OAuth access token for the warehouse API
    #[arg(long, env = "DRYRUN_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Concurrent nodes per generation
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Per request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Failures of these nodes do not fail the run
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Write a JSON report here
    #[arg(long)]
    report_path: Option<PathBuf>,

    /// Mark uncompiled nodes as skipped instead of failed
    #[arg(long)]
    skip_not_compiled: bool,

    /// Treat incremental models as full refresh
    #[arg(long)]
    full_refresh: bool,

    /// Metadata key that also enables column linting
    #[arg(long)]
    extra_check_columns_metadata_key: Option<String>,

    /// Always exit 0 even if there are failures
    #[arg(long)]
    ignore_result: bool,
}

impl RunArgs {
    fn run_config(&self) -> RunConfig {
        let config = RunConfig::default()
            .with_threads(self.threads)
            .with_skip_not_compiled(self.skip_not_compiled)
            .with_full_refresh(self.full_refresh);
        match &self.extra_check_columns_metadata_key {
            Some(key) => config.with_extra_check_columns_metadata_key(key.clone()),
            None => config,
        }
    }

    fn warehouse_config(&self) -> BigQueryConfig {
        let config = BigQueryConfig::new(
            self.project.clone(),
            SecretString::from(self.access_token.clone()),
        )
        .with_timeout(Duration::from_secs(self.timeout_secs));
        match &self.location {
            Some(location) => config.with_location(location.clone()),
            None => config,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = args.run_config();
    config.validate()?;
    let manifest = args.select.manifest()?;

    let warehouse = BigQueryWarehouse::new(args.warehouse_config())?;
    let warehouse = Arc::new(RetryingWarehouse::new(warehouse));
    let engine = ExecutionEngine::new(warehouse, config);

    let progress = spinner(format!("Dry running {}", args.select.manifest_path.display()));
    let outcome = engine.run(&manifest, &args.select.filter()).await;
    progress.finish_and_clear();
    let results = outcome?;

    if let Some(path) = &args.report_path {
        Report::from_results(&results)
            .write_to(path)
            .wrap_err_with(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    let code = ResultReporter::new(&results)
        .with_exclude(args.exclude.iter().cloned())
        .report(&mut std::io::stdout().lock())?;
    if args.ignore_result {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from))
}

fn plan(args: &SelectArgs) -> Result<ExitCode> {
    let manifest = args.manifest()?;
    let dag = Dag::build(&manifest, &args.filter())?;
    let generations = Scheduler::from_dag(&dag).generations()?;
    for (index, generation) in generations.iter().enumerate() {
        println!("Generation {}:", index);
        for node_id in generation {
            println!("  {}", node_id);
        }
    }
    println!("{} nodes in {} generations", dag.len(), generations.len());
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Plan(args) => plan(&args),
    }
}
