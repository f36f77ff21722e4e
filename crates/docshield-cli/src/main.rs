//! Docshield command-line entry point.
//!
//! `docshield worker` runs the redaction worker; the other subcommands are
//! operator tools against the same database, storage and queue. Configuration
//! comes from the environment (a `.env` file is honored).

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use docshield_cli::commands;
use docshield_cli::print_json;
use docshield_cli::setup::AppContext;
use docshield_core::config::LogFormat;
use docshield_core::Config;
use docshield_infra::{init_telemetry, shutdown_signal, shutdown_telemetry, TelemetryOptions};
use docshield_worker::{ConsumerConfig, JobConsumer};

#[derive(Parser)]
#[command(name = "docshield", version, about = "Asynchronous document redaction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the redaction worker until SIGINT or SIGTERM
    Worker,
    /// Upload a file and register it as a new document
    Register {
        /// Path to the file to upload
        file: PathBuf,
        /// Stored file name (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Request redaction of a document
    Submit {
        /// Document UUID
        document_id: Uuid,
        /// Phrase to redact (repeatable)
        #[arg(long = "phrase", short = 'p')]
        phrases: Vec<String>,
    },
    /// Show a document's status
    Status {
        /// Document UUID
        document_id: Uuid,
    },
    /// Download the redacted copy of a completed document
    Download {
        /// Document UUID
        document_id: Uuid,
        /// Output path (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Redact a local file and print the result, without queue or database
    Redact {
        /// Path to the file to redact
        file: PathBuf,
        /// Phrase to redact (repeatable)
        #[arg(long = "phrase", short = 'p')]
        phrases: Vec<String>,
        /// Per-phrase match timeout in milliseconds
        #[arg(long, env = "PATTERN_MATCH_TIMEOUT_MS", default_value_t = 1000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Redact {
        file,
        phrases,
        timeout_ms,
    } = &cli.command
    {
        init_telemetry(&TelemetryOptions::new("docshield-cli", "local"))
            .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;
        let (redacted, report) = commands::redact_file(
            file,
            phrases,
            std::time::Duration::from_millis(*timeout_ms),
        )
        .await?;
        tracing::debug!(
            replacements = report.replacements,
            fallbacks = report.fallbacks,
            "File redacted"
        );
        print!("{}", redacted);
        return Ok(());
    }

    let config = Config::from_env()?;
    let service_name = match cli.command {
        Commands::Worker => "docshield-worker",
        _ => "docshield-cli",
    };
    let log_format = match cli.command {
        Commands::Worker => config.log_format(),
        _ => LogFormat::Compact,
    };
    init_telemetry(
        &TelemetryOptions::new(service_name, config.environment()).with_log_format(log_format),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let ctx = AppContext::initialize(config).await?;

    match cli.command {
        Commands::Worker => run_worker(ctx).await?,
        Commands::Register { file, name } => {
            let document =
                commands::register_document(ctx.store.as_ref(), ctx.storage.as_ref(), &file, name)
                    .await?;
            print_json(&document)?;
        }
        Commands::Submit {
            document_id,
            phrases,
        } => {
            let reference = ctx
                .request_service()
                .request_redaction(document_id, phrases)
                .await?;
            print_json(&serde_json::json!({
                "documentId": document_id,
                "jobId": reference.job_id,
                "deduplicated": reference.deduplicated,
            }))?;
        }
        Commands::Status { document_id } => {
            let report =
                commands::document_report(ctx.store.as_ref(), ctx.storage.as_ref(), document_id)
                    .await?;
            print_json(&report)?;
        }
        Commands::Download {
            document_id,
            output,
        } => {
            let content =
                commands::download_redacted(ctx.store.as_ref(), ctx.storage.as_ref(), document_id)
                    .await?;
            match output {
                Some(path) => tokio::fs::write(&path, &content)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => std::io::stdout()
                    .write_all(&content)
                    .context("Failed to write to stdout")?,
            }
        }
        Commands::Redact { .. } => {}
    }

    Ok(())
}

async fn run_worker(ctx: AppContext) -> Result<()> {
    let consumer_config = ConsumerConfig::from_config(&ctx.config);
    tracing::info!(
        max_concurrency = consumer_config.max_concurrency,
        job_timeout_secs = ctx.config.job_timeout().as_secs(),
        "Redaction worker ready"
    );

    let consumer = JobConsumer::start(ctx.queue.clone(), ctx.pipeline(), consumer_config);

    shutdown_signal().await;
    consumer.shutdown().await;
    ctx.pool.close().await;
    shutdown_telemetry().await;

    Ok(())
}
