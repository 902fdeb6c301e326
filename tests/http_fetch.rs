// tests/http_fetch.rs

mod common;

use std::sync::Arc;

use snapwatch::diff::Classification;
use snapwatch::engine::{ReportScope, RunTransaction, TransactionMode, run_session};
use snapwatch::fetch::{ConditionalValidators, FailureKind, Fetcher, HttpFetcher};
use snapwatch::report::ReporterSet;
use snapwatch::store::{MemoryStore, SnapshotStore};
use snapwatch::types::ReferenceSelection;
use snapwatch_test_utils::{CountingDiffer, JobConfigBuilder, RecordingReporter, test_engine};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{init_tracing, jobs};

#[tokio::test]
async fn second_run_is_conditional_and_short_circuits() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"v1\"")
                .insert_header("content-type", "text/plain")
                .set_body_string("hello\n"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/page", server.uri());
    let job = jobs(vec![JobConfigBuilder::url(&url).build()]);
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let differ = CountingDiffer::new();
    let engine = test_engine(
        Arc::clone(&store),
        Arc::new(HttpFetcher::new().unwrap()),
        differ.clone(),
        ReferenceSelection::Closest,
    );

    let mut classifications = Vec::new();
    for _ in 0..2 {
        let recorder = RecordingReporter::new();
        let reporters = ReporterSet::new().push(recorder.clone(), true);
        let tx = RunTransaction::open(Arc::clone(&store), TransactionMode::ReadWrite, 4);
        let report = run_session(&engine, job.clone(), tx, &reporters, ReportScope::All)
            .await
            .unwrap();
        classifications.push(report.records[0].classification);
    }

    assert_eq!(classifications, vec![Classification::New, Classification::Unchanged]);
    assert_eq!(differ.calls(), 0);

    let history = store.load_history(&url, 0).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].validators.etag.as_deref(), Some("\"v1\""));
    assert_eq!(history[0].content_type.as_deref(), Some("text/plain"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].headers.get("if-none-match").is_none());
    assert!(requests[1].headers.get("if-modified-since").is_some());
}

#[tokio::test]
async fn job_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("x-token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let job = jobs(vec![
        JobConfigBuilder::url(&format!("{}/private", server.uri()))
            .header("X-Token", "secret")
            .build(),
    ])
    .remove(0);

    let fetched = HttpFetcher::new()
        .unwrap()
        .fetch(&job, &ConditionalValidators::none())
        .await
        .unwrap();
    assert_eq!(fetched.content, b"ok");
}

#[tokio::test]
async fn error_statuses_become_job_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let specs = jobs(vec![
        JobConfigBuilder::url(&format!("{}/gone", server.uri())).build(),
        JobConfigBuilder::url(&format!("{}/down", server.uri())).build(),
    ]);
    let fetcher = HttpFetcher::new().unwrap();

    let gone = fetcher
        .fetch(&specs[0], &ConditionalValidators::none())
        .await
        .unwrap_err();
    assert_eq!(gone.kind, FailureKind::HttpStatus(404));
    assert!(!gone.is_transient());

    let down = fetcher
        .fetch(&specs[1], &ConditionalValidators::none())
        .await
        .unwrap_err();
    assert_eq!(down.kind, FailureKind::HttpStatus(503));
    assert!(down.is_transient());
}

#[tokio::test]
async fn redirect_loops_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&server)
        .await;

    let job = jobs(vec![
        JobConfigBuilder::url(&format!("{}/loop", server.uri())).build(),
    ])
    .remove(0);

    let failure = HttpFetcher::new()
        .unwrap()
        .fetch(&job, &ConditionalValidators::none())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::TooManyRedirects);
}

#[tokio::test]
async fn unreachable_hosts_are_connection_failures() {
    // Nothing listens on port 9 of localhost in the test environment.
    let job = jobs(vec![JobConfigBuilder::url("http://127.0.0.1:9/").timeout_secs(5).build()])
        .remove(0);

    let failure = HttpFetcher::new()
        .unwrap()
        .fetch(&job, &ConditionalValidators::none())
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Connection);
}
