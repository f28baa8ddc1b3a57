//! Bounded-concurrency bulk creation.
//!
//! Payloads are generated up front, cut into contiguous batches and pushed
//! through the bulk-create endpoint with at most `max_parallel` calls in
//! flight. Each call backs off independently inside the executor, so a 429
//! on one batch does not stall the others.
//!
//! A batch that exhausts its retries is logged and abandoned; the run carries
//! on with the remaining batches. Retries resend the identical batch, so a
//! call that timed out after the server accepted it can create duplicates.

use crate::config::validate_batching;
use crate::error::Result;
use crate::executor::RequestExecutor;
use crate::jira::Endpoints;
use crate::payload::{Payload, PayloadSource};
use crate::types::{Event, PopulateReport};
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Result of dispatching one batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BatchOutcome {
    Created(usize),
    Failed,
    Skipped,
}

/// Pushes generated payloads to the bulk-create endpoint
pub struct BatchPopulator {
    executor: RequestExecutor,
    endpoints: Endpoints,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl BatchPopulator {
    /// Create a populator
    pub fn new(
        executor: RequestExecutor,
        endpoints: Endpoints,
        event_tx: broadcast::Sender<Event>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            executor,
            endpoints,
            event_tx,
            cancel_token,
        }
    }

    /// Generate `total_count` payloads from `source` and create them in batches
    ///
    /// Completion is best-effort: the report counts failed batches instead of
    /// returning an error for them.
    ///
    /// # Errors
    /// Returns [`Error::Config`](crate::Error::Config) when `batch_size` is
    /// zero or above the remote limit, or `max_parallel` is zero.
    pub async fn populate(
        &self,
        source: &mut dyn PayloadSource,
        total_count: usize,
        batch_size: usize,
        max_parallel: usize,
    ) -> Result<PopulateReport> {
        validate_batching(batch_size, max_parallel)?;

        tracing::info!(total_count, "generating payloads");
        let payloads: Vec<Payload> = (0..total_count).map(|_| source.next_payload()).collect();
        let batches = partition(payloads, batch_size);
        let batch_count = batches.len();
        tracing::info!(
            batches = batch_count,
            batch_size,
            max_parallel,
            "dispatching batches"
        );

        let outcomes: Vec<BatchOutcome> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| self.dispatch(index + 1, batch_count, batch))
            .buffer_unordered(max_parallel)
            .collect()
            .await;

        let mut report = PopulateReport {
            batches: batch_count,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Created(size) => {
                    report.succeeded += 1;
                    report.records_sent += size;
                }
                BatchOutcome::Failed => report.failed += 1,
                BatchOutcome::Skipped => report.skipped += 1,
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            records_sent = report.records_sent,
            "populate finished"
        );
        self.event_tx.send(Event::PopulateCompleted { report }).ok();
        Ok(report)
    }

    async fn dispatch(
        &self,
        batch: usize,
        batch_count: usize,
        payloads: Vec<Payload>,
    ) -> BatchOutcome {
        let size = payloads.len();
        if self.cancel_token.is_cancelled() {
            tracing::debug!(batch, "shutdown requested, batch not dispatched");
            return BatchOutcome::Skipped;
        }

        let result = match self
            .endpoints
            .bulk_create_request(&payloads, self.executor.retry_config())
        {
            Ok(request) => self.executor.execute(&request).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(batch, batch_count, size, "batch created");
                self.event_tx.send(Event::BatchCreated { batch, size }).ok();
                BatchOutcome::Created(size)
            }
            Err(e) => {
                tracing::error!(batch, batch_count, size, error = %e, "batch abandoned");
                self.event_tx
                    .send(Event::BatchFailed {
                        batch,
                        size,
                        error: e.to_string(),
                    })
                    .ok();
                BatchOutcome::Failed
            }
        }
    }
}

/// Split payloads into contiguous batches of `batch_size`; the last may be shorter
pub fn partition(payloads: Vec<Payload>, batch_size: usize) -> Vec<Vec<Payload>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(payloads.len().div_ceil(batch_size));
    let mut payloads = payloads.into_iter().peekable();
    while payloads.peek().is_some() {
        batches.push(payloads.by_ref().take(batch_size).collect());
    }
    batches
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JiraConfig, RetryConfig};
    use crate::payload::TemplateGenerator;
    use crate::retry::RecordingSleeper;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn numbered(count: usize) -> Vec<Payload> {
        (0..count)
            .map(|i| Payload::task("OPS", format!("s{i}"), format!("d{i}")))
            .collect()
    }

    fn populator(server: &MockServer, cancel_token: CancellationToken) -> BatchPopulator {
        let retry = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        };
        let executor = RequestExecutor::new(retry)
            .unwrap()
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        let endpoints = Endpoints::new(&JiraConfig {
            base_url: server.uri(),
            email: "bot@acme.test".into(),
            api_token: "secret".into(),
            project_key: "OPS".into(),
        });
        let (event_tx, _) = broadcast::channel(64);
        BatchPopulator::new(executor, endpoints, event_tx, cancel_token)
    }

    #[test]
    fn partition_sizes_and_order() {
        let batches = partition(numbered(120), 50);

        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(batches[0][0].fields.summary, "s0");
        assert_eq!(batches[1][0].fields.summary, "s50");
        assert_eq!(batches[2][19].fields.summary, "s119");
    }

    #[test]
    fn partition_edge_cases() {
        assert!(partition(Vec::new(), 50).is_empty());
        assert_eq!(partition(numbered(50), 50).len(), 1);
        assert_eq!(partition(numbered(51), 50).len(), 2);
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/issue/bulk"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/issue/bulk"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let mut source = TemplateGenerator::with_seed("OPS", 1);
        // Sequential dispatch so the first batch takes both failures
        let report = populator(&server, CancellationToken::new())
            .populate(&mut source, 120, 50, 1)
            .await
            .unwrap();

        assert_eq!(report.batches, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.records_sent, 70);
    }

    #[tokio::test]
    async fn cancelled_run_skips_every_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        token.cancel();
        let mut source = TemplateGenerator::with_seed("OPS", 1);
        let report = populator(&server, token)
            .populate(&mut source, 100, 50, 3)
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 0);
    }

    #[tokio::test]
    async fn invalid_batching_is_rejected() {
        let server = MockServer::start().await;
        let populator = populator(&server, CancellationToken::new());
        let mut source = TemplateGenerator::with_seed("OPS", 1);

        assert!(populator.populate(&mut source, 10, 0, 3).await.is_err());
        assert!(populator.populate(&mut source, 10, 51, 3).await.is_err());
        assert!(populator.populate(&mut source, 10, 50, 0).await.is_err());
    }
}
