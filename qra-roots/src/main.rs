//! qra-roots - multi-source root extraction driver
//!
//! Subcommands run one pipeline stage against the database under the
//! resolved root folder and print a JSON summary on stdout. Logs go to
//! stderr (or the configured log file).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qra_common::config::{self as common_config, LoggingConfig, TomlConfig};
use qra_roots::config::PipelineConfig;
use qra_roots::discrepancy::DiscrepancyChecker;
use qra_roots::jobs::orchestrator::JobOrchestrator;
use qra_roots::jobs::SubmittedJob;
use qra_roots::{reconcile, reference_linker, tokenizer, PipelineContext};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "qra-roots")]
#[command(about = "Tokenize verse text and assign verified roots", long_about = None)]
#[command(version)]
struct Cli {
    /// Folder holding the database and cache files
    #[arg(long, global = true, env = common_config::ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to ~/.config/qra/config.toml)
    #[arg(long, global = true, env = common_config::CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a container's verses into word tokens
    Tokenize {
        /// Verse file (`c|v|text` or `c:v text` per line)
        #[arg(short, long)]
        input: PathBuf,

        /// Container number to tokenize
        #[arg(short, long)]
        container: i64,

        /// Verses per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Assign roots to every MISSING token of a container
    Extract {
        #[arg(short, long)]
        container: i64,

        /// Tokens per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Re-classify stored source maps and fill in MISSING tokens
    Reconcile {
        /// Sources that must agree before a token counts as verified
        #[arg(long)]
        min_sources: Option<usize>,
    },

    /// Build per-token cross references and the roots table
    Link {
        #[arg(long)]
        max_references: Option<usize>,
    },

    /// Show a job's recorded status
    Status {
        job_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(common_config::config_file_path);
    let toml_config = match &config_path {
        Some(path) => common_config::load_toml_config(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&toml_config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting qra-roots"
    );

    let root_folder = match (&cli.root_folder, toml_config.root_folder.clone()) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => path,
        (None, None) => common_config::resolve_root_folder(None),
    };
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    let pipeline_config = PipelineConfig::load(config_path.as_deref()).context("Invalid pipeline configuration")?;
    let ctx = PipelineContext::open(&root_folder, pipeline_config)
        .await
        .context("Failed to open pipeline")?;
    let orchestrator = JobOrchestrator::new(Arc::new(ctx));

    match cli.command {
        Commands::Tokenize {
            input,
            container,
            chunk_size,
        } => {
            let verses = tokenizer::load_container_verses(&input, container)
                .await
                .with_context(|| format!("Failed to read verses from {}", input.display()))?;
            let submitted = orchestrator
                .submit_tokenization(container, verses, chunk_size)
                .await
                .context("Failed to submit tokenization job")?;
            run_to_completion(&orchestrator, submitted).await
        }
        Commands::Extract { container, chunk_size } => {
            let submitted = orchestrator
                .submit_root_extraction(container, chunk_size)
                .await
                .context("Failed to submit root extraction job")?;
            run_to_completion(&orchestrator, submitted).await
        }
        Commands::Reconcile { min_sources } => {
            let ctx = orchestrator.context();
            let checker = match min_sources {
                Some(min) => DiscrepancyChecker::new(min),
                None => ctx.discrepancy_checker(),
            };
            let report = reconcile::reconcile(&ctx.db, &checker, ctx.config.db_max_lock_wait_ms)
                .await
                .context("Reconciliation failed")?;
            print_json(&report)
        }
        Commands::Link { max_references } => {
            let ctx = orchestrator.context();
            let max = max_references.unwrap_or(ctx.config.max_references);
            let report = reference_linker::persist(&ctx.db, max, ctx.config.db_max_lock_wait_ms)
                .await
                .context("Reference linking failed")?;
            print_json(&report)
        }
        Commands::Status { job_id } => {
            let status = orchestrator
                .job_status(job_id)
                .await
                .with_context(|| format!("No status for job {}", job_id))?;
            print_json(&status)
        }
    }
}

/// Wait for a submitted job, cancelling it on Ctrl+C
async fn run_to_completion(orchestrator: &JobOrchestrator, submitted: SubmittedJob) -> Result<()> {
    info!(job_id = %submitted.job_id, chunks = submitted.chunks_queued, "Job submitted");

    let status = tokio::select! {
        status = orchestrator.wait_for_job(submitted.job_id) => status?,
        _ = tokio::signal::ctrl_c() => {
            warn!(job_id = %submitted.job_id, "Interrupted, cancelling job");
            orchestrator.cancel_all().await;
            orchestrator.wait_for_job(submitted.job_id).await?
        }
    };

    print_json(&status)?;
    if let Some(error) = &status.error {
        anyhow::bail!("Job {} failed: {}", status.job_id, error);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match &logging.file {
        Some(path) => {
            let file = open_log_file(path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e)),
    }
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
