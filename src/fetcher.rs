//! Resumable, cursor-driven retrieval of every record in a project.
//!
//! The loop is strictly sequential: each page needs the previous page's
//! cursor. After every page the accumulated descriptions and the new cursor
//! are written to the [`CheckpointStore`] before anything else happens, so a
//! crash or abort never loses a page that was already retrieved.
//!
//! ```text
//! Starting ──(complete checkpoint)──────────────────────────► Done
//!    │
//!    ▼
//! FetchingPage ──(no issues)──► Done
//!    │     ▲  └──(retries exhausted)──► Failed
//!    ▼     │
//! Persisting ──(last page)──► Done
//! ```

use crate::checkpoint::CheckpointStore;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::jira::{Endpoints, SearchPage};
use crate::types::{Event, Record};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Position of the fetch loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchState {
    /// Loading the checkpoint
    Starting,
    /// Waiting on one search call
    FetchingPage,
    /// Writing the checkpoint for the page just retrieved
    Persisting,
    /// Every page retrieved
    Done,
    /// Retries exhausted or shutdown requested; checkpoint kept
    Failed,
}

/// Drives the paginated search through the executor and checkpoint store
pub struct PaginatedFetcher {
    executor: RequestExecutor,
    endpoints: Endpoints,
    store: Arc<dyn CheckpointStore>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl PaginatedFetcher {
    /// Create a fetcher
    pub fn new(
        executor: RequestExecutor,
        endpoints: Endpoints,
        store: Arc<dyn CheckpointStore>,
        event_tx: broadcast::Sender<Event>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            executor,
            endpoints,
            store,
            event_tx,
            cancel_token,
        }
    }

    /// Retrieve every record of `project_key`, resuming from the checkpoint if one exists
    ///
    /// Records come back in ascending creation order.
    ///
    /// # Errors
    /// - [`Error::FetchAborted`] when a page exhausted its retries or shutdown
    ///   was requested; `retrieved` counts the records persisted so far and the
    ///   checkpoint is left for the next run
    /// - [`Error::Config`] when `page_size` is zero
    /// - checkpoint errors from the store
    pub async fn fetch(&self, project_key: &str, page_size: usize) -> Result<Vec<Record>> {
        if page_size == 0 {
            return Err(Error::config("fetch.page_size", "must be at least 1"));
        }

        let mut state = FetchState::Starting;
        tracing::debug!(?state, project_key, "fetch starting");
        let checkpoint = self.store.load().await?;

        if checkpoint.is_complete() {
            tracing::info!(
                total = checkpoint.issues.len(),
                "fetch already completed according to checkpoint"
            );
            self.emit(Event::FetchCompleted {
                total: checkpoint.issues.len(),
            });
            return Ok(into_records(checkpoint.issues));
        }

        let mut issues = checkpoint.issues;
        let mut cursor = checkpoint.next_page_token;
        if issues.is_empty() {
            tracing::info!(project_key, "starting new fetch");
            self.emit(Event::FetchStarted {
                project_key: project_key.to_string(),
            });
        } else {
            tracing::info!(records = issues.len(), "resumed fetch");
            self.emit(Event::FetchResumed {
                records: issues.len(),
            });
        }

        let retry = self.executor.retry_config().clone();
        let mut page_number = 0usize;

        loop {
            if self.cancel_token.is_cancelled() {
                return Err(self.abort(issues.len(), Error::Cancelled));
            }

            state = FetchState::FetchingPage;
            page_number += 1;
            tracing::debug!(?state, page = page_number, cursor = ?cursor, "requesting page");

            let page = match self
                .fetch_page(project_key, page_size, cursor.as_deref(), &retry)
                .await
            {
                Ok(page) => page,
                Err(e) => return Err(self.abort(issues.len(), e)),
            };

            // The last persisted cursor stays in place so a rerun asks for this page again
            if page.issues.is_empty() {
                tracing::info!(
                    page = page_number,
                    cursor = ?cursor,
                    "page returned no issues, stopping"
                );
                break;
            }

            state = FetchState::Persisting;
            let page_records = page.issues.len();
            issues.extend(page.records().into_iter().map(|r| r.description));
            let is_final = page.is_final();
            cursor = if is_final { None } else { page.next_page_token };
            self.store.save(&issues, cursor.as_deref()).await?;

            tracing::info!(
                ?state,
                page = page_number,
                page_records,
                total = issues.len(),
                "fetched page"
            );
            self.emit(Event::PageFetched {
                page: page_number,
                page_records,
                total: issues.len(),
            });

            if is_final {
                break;
            }
        }

        state = FetchState::Done;
        tracing::info!(?state, total = issues.len(), "fetch complete");
        self.emit(Event::FetchCompleted {
            total: issues.len(),
        });
        Ok(into_records(issues))
    }

    async fn fetch_page(
        &self,
        project_key: &str,
        page_size: usize,
        cursor: Option<&str>,
        retry: &RetryConfig,
    ) -> Result<SearchPage> {
        let request = self
            .endpoints
            .search_request(project_key, page_size, cursor, retry);
        let body = self.executor.execute(&request).await?;
        SearchPage::from_value(body)
    }

    fn abort(&self, retrieved: usize, source: Error) -> Error {
        let state = FetchState::Failed;
        tracing::error!(?state, retrieved, error = %source, "fetch aborted, checkpoint kept");
        self.emit(Event::FetchFailed {
            retrieved,
            error: source.to_string(),
        });
        Error::FetchAborted {
            retrieved,
            source: Box::new(source),
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}

fn into_records(issues: Vec<String>) -> Vec<Record> {
    issues.into_iter().map(Record::new).collect()
}
