//! Codegate CLI: submit reports and run the report processor.
//!
//! Configuration comes from the environment (and `.env`); see `codegate_core::config`.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use codegate_cli::upload::collect_files;
use codegate_cli::{open_upload, Pipeline, UploadOptions};
use codegate_core::{Config, QueueBackend};
use codegate_infra::{init_telemetry, shutdown_signal, shutdown_telemetry};
use codegate_storage::ContentStore;

#[derive(Parser)]
#[command(name = "codegate", version, about = "Codegate report ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store report files and enqueue them for processing
    Submit(SubmitArgs),
    /// Drain the processing queue until Ctrl+C / SIGTERM
    Process,
    /// Submit report files, then process the queue in the same process
    ///
    /// Needed with the in-memory queue, which does not outlive the process.
    Run(SubmitArgs),
    /// Print the scan status of a stored report
    ScanStatus {
        /// Storage URL returned by `submit`
        url: String,
    },
}

#[derive(Args)]
struct SubmitArgs {
    /// Report files, or directories whose files are all submitted
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Organisation the reports belong to
    #[arg(long, short = 'o')]
    organisation: String,
    /// Project the reports belong to
    #[arg(long, short = 'p')]
    project: String,
    /// Content type (guessed from the file extension when omitted)
    #[arg(long)]
    content_type: Option<String>,
    /// Content encoding: identity, br or gzip (detected from .br/.gz when omitted)
    #[arg(long)]
    encoding: Option<String>,
    /// Custom metadata attached to every report
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    metadata: Vec<String>,
}

impl SubmitArgs {
    fn options(&self) -> UploadOptions {
        UploadOptions {
            organisation: self.organisation.clone(),
            project: self.project.clone(),
            file_name: None,
            content_type: self.content_type.clone(),
            encoding: self.encoding.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

async fn submit(pipeline: &Pipeline, args: &SubmitArgs) -> anyhow::Result<()> {
    let submitter = pipeline.submitter();
    let options = args.options();

    for path in collect_files(&args.files).await? {
        let request = open_upload(&path, &options).await?;
        let report = submitter
            .submit(request)
            .await
            .with_context(|| format!("Failed to submit {}", path.display()))?;
        println!("{}", serde_json::to_string(&report)?);
    }

    // Background scans die with the process.
    pipeline.store().flush().await;
    Ok(())
}

async fn process(pipeline: &Pipeline) {
    let handle = pipeline.processor().spawn();
    shutdown_signal().await;
    handle.shutdown().await;
    pipeline.store().flush().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry(config.log_filter(), config.log_json())?;
    tracing::debug!(environment = %config.environment(), "Configuration loaded");

    let pipeline = Pipeline::from_config(config).await?;

    let result = match cli.command {
        Commands::Submit(args) => {
            if pipeline.config().queue_backend() == QueueBackend::Memory {
                tracing::warn!(
                    "Submitting to the in-memory queue; messages are lost when this command exits (use `codegate run`)"
                );
            }
            submit(&pipeline, &args).await
        }
        Commands::Process => {
            process(&pipeline).await;
            Ok(())
        }
        Commands::Run(args) => {
            let submitted = submit(&pipeline, &args).await;
            if submitted.is_ok() {
                process(&pipeline).await;
            }
            submitted
        }
        Commands::ScanStatus { url } => pipeline
            .store()
            .scan_status(&url)
            .await
            .map(|status| println!("{}", status))
            .with_context(|| format!("Failed to read scan status of {}", url)),
    };

    shutdown_telemetry().await;
    result
}
