//! Core types and events

use serde::{Deserialize, Serialize};

/// One fetched work item
///
/// A read-only snapshot of the item's description. Items whose description
/// could not be located in the response carry an empty string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Plain-text description
    pub description: String,
}

impl Record {
    /// Create a record from its description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// Outcome counts of a populate run
///
/// Completion is best-effort: failed batches are counted, not retried again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateReport {
    /// Batches the records were partitioned into
    pub batches: usize,
    /// Batches the remote API accepted
    pub succeeded: usize,
    /// Batches abandoned after exhausting their retries
    pub failed: usize,
    /// Batches never dispatched because shutdown was requested
    pub skipped: usize,
    /// Records in accepted batches
    pub records_sent: usize,
}

/// Progress events emitted by [`IssueSync`](crate::IssueSync)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A fetch started with no prior progress
    FetchStarted {
        /// Project being fetched
        project_key: String,
    },

    /// A fetch resumed from a checkpoint
    FetchResumed {
        /// Records already retrieved by earlier runs
        records: usize,
    },

    /// A page was retrieved and persisted
    PageFetched {
        /// 1-based page number within this run
        page: usize,
        /// Records on this page
        page_records: usize,
        /// Records accumulated so far, including resumed ones
        total: usize,
    },

    /// The fetch reached the last page
    FetchCompleted {
        /// Total records retrieved
        total: usize,
    },

    /// The fetch stopped early; the checkpoint is kept for resume
    FetchFailed {
        /// Records retrieved before the failure
        retrieved: usize,
        /// Error message
        error: String,
    },

    /// A bulk-create batch was accepted
    BatchCreated {
        /// 1-based batch number in submission order
        batch: usize,
        /// Records in the batch
        size: usize,
    },

    /// A bulk-create batch was abandoned after exhausting retries
    BatchFailed {
        /// 1-based batch number in submission order
        batch: usize,
        /// Records in the batch
        size: usize,
        /// Error message
        error: String,
    },

    /// A populate run finished
    PopulateCompleted {
        /// Outcome counts
        report: PopulateReport,
    },
}
