use clap::{Parser, Subcommand};
use issue_sync::{Config, IssueSync, Record};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "issue-sync",
    version,
    about = "Bulk-create synthetic issues and fetch a project's issues with resume"
)]
struct Cli {
    /// JSON config file; JIRA_DOMAIN, EMAIL, API_TOKEN and PROJECT_KEY from the
    /// environment (or .env) override its connection settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create synthetic issues in bulk
    Populate {
        /// Number of issues to create
        #[arg(long)]
        count: Option<usize>,

        /// Issues per bulk-create call (at most 50)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Bulk-create calls in flight at once
        #[arg(long)]
        max_parallel: Option<usize>,
    },
    /// Fetch every issue description of the project, resuming from the checkpoint
    Fetch {
        /// Issues per page
        #[arg(long)]
        page_size: Option<usize>,

        /// Checkpoint file location
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Discard any existing checkpoint and start from the first page
        #[arg(long)]
        fresh: bool,

        /// Write the records as JSON to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Populate {
            count,
            batch_size,
            max_parallel,
        } => {
            if let Some(count) = count {
                config.populate.total_issues = count;
            }
            if let Some(batch_size) = batch_size {
                config.populate.batch_size = batch_size;
            }
            if let Some(max_parallel) = max_parallel {
                config.populate.max_parallel = max_parallel;
            }

            let sync = IssueSync::new(config)?;
            spawn_signal_handler(&sync);

            let report = sync.populate().await?;
            info!(
                batches = report.batches,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                records_sent = report.records_sent,
                "populate run finished"
            );
        }
        Commands::Fetch {
            page_size,
            checkpoint,
            fresh,
            output,
        } => {
            if let Some(page_size) = page_size {
                config.fetch.page_size = page_size;
            }
            if let Some(checkpoint) = checkpoint {
                config.fetch.checkpoint_path = checkpoint;
            }

            let sync = IssueSync::new(config)?;
            if fresh {
                sync.clear_checkpoint().await?;
            }
            spawn_signal_handler(&sync);

            let records = match sync.fetch().await {
                Ok(records) => records,
                Err(e) => {
                    error!(
                        retrieved = e.retrieved(),
                        error = %e,
                        "fetch aborted; rerun to resume from the checkpoint"
                    );
                    return Err(e.into());
                }
            };
            info!(total = records.len(), "total issues fetched");
            write_records(&records, output).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> issue_sync::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

fn spawn_signal_handler(sync: &IssueSync) {
    let token = sync.shutdown_token();
    tokio::spawn(async move {
        issue_sync::wait_for_signal().await;
        info!("stopping after the work in flight");
        token.cancel();
    });
}

async fn write_records(records: &[Record], output: Option<PathBuf>) -> issue_sync::Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            info!(path = %path.display(), "records written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
