//! Common test utilities for issue-sync integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use issue_sync::config::{JiraConfig, RetryConfig};
use issue_sync::{Config, IssueSync, RecordingSleeper};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::{Request, Respond, ResponseTemplate};

pub const SEARCH_PATH: &str = "/rest/api/3/search/jql";
pub const BULK_PATH: &str = "/rest/api/3/issue/bulk";

/// Config pointing at a mock server with fast, unjittered retries
pub fn test_config(base_url: &str, checkpoint: &Path) -> Config {
    let mut config = Config {
        jira: JiraConfig {
            base_url: base_url.to_string(),
            email: "bot@acme.test".into(),
            api_token: "secret".into(),
            project_key: "OPS".into(),
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: false,
            ..Default::default()
        },
        ..Default::default()
    };
    config.fetch.checkpoint_path = checkpoint.to_path_buf();
    config
}

/// IssueSync whose backoff pauses are recorded instead of slept
pub fn test_sync(config: Config) -> (IssueSync, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let sync = IssueSync::new(config).unwrap().with_sleeper(sleeper.clone());
    (sync, sleeper)
}

/// Descriptions of a synthetic project, in creation order
pub fn descriptions(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("issue number {i}")).collect()
}

/// An issue object shaped like the tracker's search results
pub fn issue_json(description: &str) -> Value {
    json!({
        "id": "10000",
        "fields": {
            "description": {
                "type": "doc",
                "version": 1,
                "content": [{
                    "type": "paragraph",
                    "content": [{"type": "text", "text": description}]
                }]
            }
        }
    })
}

/// Serves a project's issues page by page, using the offset as the page token
///
/// Pages starting at or beyond `fail_from` answer 500.
pub struct PagedProject {
    pub issues: Vec<String>,
    pub fail_from: Option<usize>,
}

impl PagedProject {
    pub fn new(issues: Vec<String>) -> Self {
        Self {
            issues,
            fail_from: None,
        }
    }

    pub fn failing_from(issues: Vec<String>, offset: usize) -> Self {
        Self {
            issues,
            fail_from: Some(offset),
        }
    }
}

impl Respond for PagedProject {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut offset = 0usize;
        let mut page_size = 50usize;
        for (key, value) in request.url.query_pairs() {
            match key.as_ref() {
                "nextPageToken" => offset = value.parse().unwrap(),
                "maxResults" => page_size = value.parse().unwrap(),
                _ => {}
            }
        }

        if self.fail_from.is_some_and(|limit| offset >= limit) {
            return ResponseTemplate::new(500).set_body_string("internal error");
        }

        let end = (offset + page_size).min(self.issues.len());
        let page: Vec<Value> = self.issues[offset.min(end)..end]
            .iter()
            .map(|d| issue_json(d))
            .collect();
        let is_last = end >= self.issues.len();
        let mut body = json!({"issues": page, "isLast": is_last});
        if !is_last {
            body["nextPageToken"] = json!(end.to_string());
        }
        ResponseTemplate::new(200).set_body_json(body)
    }
}

/// Answers 201 after a fixed delay and records the most calls ever in flight
///
/// A call is in flight from its arrival until `delay` has passed; the client
/// cannot issue a follow-up call on the same slot before then.
#[derive(Clone)]
pub struct InFlightTracker {
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
    peak: Arc<AtomicUsize>,
}

impl InFlightTracker {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            arrivals: Arc::new(Mutex::new(Vec::new())),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Highest number of overlapping calls seen so far
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Respond for InFlightTracker {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now = Instant::now();
        let mut arrivals = self.arrivals.lock().unwrap();
        arrivals.retain(|at| now.duration_since(*at) < self.delay);
        arrivals.push(now);
        self.peak.fetch_max(arrivals.len(), Ordering::SeqCst);
        ResponseTemplate::new(201).set_delay(self.delay)
    }
}

/// Page tokens sent by the search requests a server received, in order
pub fn tokens_sent(requests: &[Request]) -> Vec<Option<String>> {
    requests
        .iter()
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "nextPageToken")
                .map(|(_, v)| v.into_owned())
        })
        .collect()
}
