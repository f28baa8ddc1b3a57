//! # issue-sync
//!
//! Resilient bulk transfer of work items to and from an issue-tracker REST API.
//!
//! Two independent directions share one retrying request executor:
//! - **populate** generates synthetic issues and creates them through the
//!   bulk-create endpoint in fixed-size batches, with a bounded number of
//!   calls in flight
//! - **fetch** pages through every issue of a project in creation order,
//!   checkpointing after each page so an interrupted run resumes where it
//!   stopped
//!
//! ## Quick Start
//!
//! ```no_run
//! use issue_sync::{Config, IssueSync};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let sync = IssueSync::new(config)?;
//!
//!     let mut events = sync.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let records = sync.fetch().await?;
//!     println!("fetched {} records", records.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Fetch progress persistence
pub mod checkpoint;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Single-request executor with retries
pub mod executor;
/// Resumable paginated fetch
pub mod fetcher;
/// Remote REST surface
pub mod jira;
/// Synthetic issue payloads
pub mod payload;
/// Bounded-concurrency bulk creation
pub mod populator;
/// Backoff, Retry-After parsing and sleep injection
pub mod retry;
/// Core types and events
pub mod types;

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::Config;
pub use error::{Error, Result};
pub use executor::{ApiRequest, Credentials, HttpMethod, RequestExecutor};
pub use fetcher::{FetchState, PaginatedFetcher};
pub use jira::Endpoints;
pub use payload::{Payload, PayloadSource, TemplateGenerator};
pub use populator::BatchPopulator;
pub use retry::{RecordingSleeper, Sleeper, TokioSleeper};
pub use types::{Event, PopulateReport, Record};

/// Capacity of the progress event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Entry point wiring configuration, executor, checkpoint store and events
pub struct IssueSync {
    config: Config,
    executor: RequestExecutor,
    endpoints: Endpoints,
    store: Arc<dyn CheckpointStore>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl IssueSync {
    /// Validate `config` and build the components
    ///
    /// Fetch progress is kept in the file named by `config.fetch.checkpoint_path`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let executor = RequestExecutor::new(config.retry.clone())?;
        let endpoints = Endpoints::new(&config.jira);
        let store: Arc<dyn CheckpointStore> =
            Arc::new(FileCheckpointStore::new(&config.fetch.checkpoint_path));
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            executor,
            endpoints,
            store,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Keep fetch progress in `store` instead of the configured file
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = store;
        self
    }

    /// Use `sleeper` for every backoff pause
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.executor = self.executor.with_sleeper(sleeper);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops fetches between pages and populates between batches
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Request a cooperative stop of running operations
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.cancel_token.cancel();
    }

    /// Fetcher sharing this instance's executor, store and events
    pub fn fetcher(&self) -> PaginatedFetcher {
        PaginatedFetcher::new(
            self.executor.clone(),
            self.endpoints.clone(),
            Arc::clone(&self.store),
            self.event_tx.clone(),
            self.cancel_token.clone(),
        )
    }

    /// Populator sharing this instance's executor and events
    pub fn populator(&self) -> BatchPopulator {
        BatchPopulator::new(
            self.executor.clone(),
            self.endpoints.clone(),
            self.event_tx.clone(),
            self.cancel_token.clone(),
        )
    }

    /// Fetch the configured project with the configured page size
    pub async fn fetch(&self) -> Result<Vec<Record>> {
        self.fetch_with(&self.config.jira.project_key, self.config.fetch.page_size)
            .await
    }

    /// Fetch `project_key` in pages of `page_size`
    pub async fn fetch_with(&self, project_key: &str, page_size: usize) -> Result<Vec<Record>> {
        self.fetcher().fetch(project_key, page_size).await
    }

    /// Create the configured number of template-generated issues
    pub async fn populate(&self) -> Result<PopulateReport> {
        let populate = &self.config.populate;
        let mut source = TemplateGenerator::new(&self.config.jira.project_key);
        self.populate_with(
            &mut source,
            populate.total_issues,
            populate.batch_size,
            populate.max_parallel,
        )
        .await
    }

    /// Create `total_count` issues from `source`
    pub async fn populate_with(
        &self,
        source: &mut dyn PayloadSource,
        total_count: usize,
        batch_size: usize,
        max_parallel: usize,
    ) -> Result<PopulateReport> {
        self.populator()
            .populate(source, total_count, batch_size, max_parallel)
            .await
    }

    /// Forget fetch progress so the next fetch starts from the first page
    pub async fn clear_checkpoint(&self) -> Result<()> {
        self.store.clear().await
    }
}

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Wait for a termination signal (Ctrl+C).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
