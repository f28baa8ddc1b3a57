//! Paginated fetch against a mock tracker: completeness, ordering and resume.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use issue_sync::{Checkpoint, Error, Event, Record};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn read_checkpoint(path: &std::path::Path) -> Checkpoint {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn every_page_size_yields_all_records_in_order() {
    let issues = descriptions(23);
    let expected: Vec<Record> = issues.iter().map(Record::new).collect();

    for page_size in [1, 2, 5, 7, 10, 23, 50] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(PagedProject::new(issues.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("checkpoint.json");
        let (sync, _) = test_sync(test_config(&server.uri(), &checkpoint));

        let records = sync.fetch_with("OPS", page_size).await.unwrap();

        assert_eq!(records, expected, "page size {page_size}");
        let saved = read_checkpoint(&checkpoint);
        assert_eq!(saved.issues.len(), 23, "page size {page_size}");
        assert!(saved.is_complete());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 23usize.div_ceil(page_size));
    }
}

#[tokio::test]
async fn resume_after_failure_fetches_only_remaining_pages() {
    let issues = descriptions(20);
    let page_size = 4;
    let pages_before_failure = 2;
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");

    // First run: the third page keeps failing
    let flaky = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::failing_from(
            issues.clone(),
            pages_before_failure * page_size,
        ))
        .mount(&flaky)
        .await;
    let (sync, _) = test_sync(test_config(&flaky.uri(), &checkpoint));

    let err = sync.fetch_with("OPS", page_size).await.unwrap_err();

    assert_eq!(err.retrieved(), 8);
    assert!(matches!(err, Error::FetchAborted { .. }));
    let saved = read_checkpoint(&checkpoint);
    assert_eq!(saved.issues, issues[..8].to_vec());
    assert_eq!(saved.next_page_token.as_deref(), Some("8"));

    // Second run: healthy server, same checkpoint
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(issues.clone()))
        .mount(&healthy)
        .await;
    let (sync, _) = test_sync(test_config(&healthy.uri(), &checkpoint));

    let records = sync.fetch_with("OPS", page_size).await.unwrap();

    let got: Vec<String> = records.into_iter().map(|r| r.description).collect();
    assert_eq!(got, issues, "no duplicates, nothing missing");
    let requests = healthy.received_requests().await.unwrap();
    assert_eq!(
        tokens_sent(&requests),
        vec![Some("8".into()), Some("12".into()), Some("16".into())],
        "resume starts at the persisted cursor"
    );
    assert_eq!(read_checkpoint(&checkpoint).issues.len(), 20);
}

#[tokio::test]
async fn empty_page_mid_run_resumes_on_rerun() {
    let issues = descriptions(4);
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");

    // First run: the second page comes back as an empty object
    let glitchy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param_is_missing("nextPageToken"))
        .respond_with(PagedProject::new(issues.clone()))
        .mount(&glitchy)
        .await;
    Mock::given(method("GET"))
        .and(query_param("nextPageToken", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&glitchy)
        .await;
    let (sync, _) = test_sync(test_config(&glitchy.uri(), &checkpoint));

    let first = sync.fetch_with("OPS", 2).await.unwrap();

    assert_eq!(first.len(), 2);
    let saved = read_checkpoint(&checkpoint);
    assert_eq!(saved.next_page_token.as_deref(), Some("2"));
    assert!(!saved.is_complete());

    // Second run picks up from the saved cursor
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(issues.clone()))
        .mount(&healthy)
        .await;
    let (sync, _) = test_sync(test_config(&healthy.uri(), &checkpoint));

    let records = sync.fetch_with("OPS", 2).await.unwrap();

    let got: Vec<String> = records.into_iter().map(|r| r.description).collect();
    assert_eq!(got, issues);
    let requests = healthy.received_requests().await.unwrap();
    assert_eq!(tokens_sent(&requests), vec![Some("2".into())]);
    assert!(read_checkpoint(&checkpoint).is_complete());
}

#[tokio::test]
async fn completed_checkpoint_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(descriptions(5)))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    let (sync, _) = test_sync(test_config(&server.uri(), &checkpoint));

    let first = sync.fetch_with("OPS", 2).await.unwrap();
    let requests_after_first = server.received_requests().await.unwrap().len();
    let second = sync.fetch_with("OPS", 2).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        requests_after_first
    );
}

#[tokio::test]
async fn fresh_start_after_clearing_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(descriptions(3)))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    let (sync, _) = test_sync(test_config(&server.uri(), &checkpoint));

    sync.fetch_with("OPS", 3).await.unwrap();
    sync.clear_checkpoint().await.unwrap();
    let records = sync.fetch_with("OPS", 3).await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn rate_limited_page_pauses_for_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(descriptions(2)))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (sync, sleeper) = test_sync(test_config(
        &server.uri(),
        &dir.path().join("checkpoint.json"),
    ));

    let records = sync.fetch_with("OPS", 10).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn empty_project_yields_zero_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(Vec::new()))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("checkpoint.json");
    let (sync, _) = test_sync(test_config(&server.uri(), &checkpoint));

    let records = sync.fetch_with("OPS", 10).await.unwrap();

    assert!(records.is_empty());
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn progress_events_follow_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(PagedProject::new(descriptions(5)))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let (sync, _) = test_sync(test_config(
        &server.uri(),
        &dir.path().join("checkpoint.json"),
    ));
    let mut events = sync.subscribe();

    sync.fetch_with("OPS", 2).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            Event::FetchStarted {
                project_key: "OPS".into()
            },
            Event::PageFetched {
                page: 1,
                page_records: 2,
                total: 2
            },
            Event::PageFetched {
                page: 2,
                page_records: 2,
                total: 4
            },
            Event::PageFetched {
                page: 3,
                page_records: 1,
                total: 5
            },
            Event::FetchCompleted { total: 5 },
        ]
    );
}
