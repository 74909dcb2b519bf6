//! End-to-end tests for the worker pool
//!
//! These tests use wiremock to create mock HTTP servers and run the
//! default HTTP page processor through the full claim/complete cycle.

use crawl_queue::config::{DispatcherConfig, HttpConfig, TelemetryConfig, WorkersConfig};
use crawl_queue::processor::HttpPageProcessor;
use crawl_queue::telemetry::Step;
use crawl_queue::{Dispatcher, EntryState, PoolStats, WorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Worker settings short enough for tests
fn test_workers_config(processing_timeout_secs: u64) -> WorkersConfig {
    WorkersConfig {
        count: 2,
        inter_request_delay_ms: 10,
        idle_poll_ms: 20,
        processing_timeout_secs,
        max_consecutive_errors: 5,
        error_backoff_secs: 1,
    }
}

fn create_pool(db_dir: &TempDir, workers: WorkersConfig) -> WorkerPool {
    let dispatcher = Dispatcher::open(&db_dir.path().join("crawl.db"), DispatcherConfig::default())
        .expect("Failed to open dispatcher");
    let processor =
        HttpPageProcessor::new(&HttpConfig::default()).expect("Failed to build processor");

    WorkerPool::new(
        Arc::new(dispatcher),
        Arc::new(processor),
        workers,
        TelemetryConfig::default(),
    )
}

async fn mount_page(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

/// Polls until nothing is pending or claimed and the pool has published
/// `items` finished items
async fn wait_for_idle(pool: &WorkerPool, items: u64) -> PoolStats {
    for _ in 0..1000 {
        let stats = pool.stats();
        let queue = pool.dispatcher().stats().expect("Failed to read stats");
        if queue.pending == 0
            && queue.claimed == 0
            && stats.total_processed() + stats.total_failed() >= items
        {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pool did not go idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crawl_follows_links_once() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{base}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="https://elsewhere.test/">Elsewhere</a>
            </body></html>"#,
            base = base_url
        ),
    )
    .await;
    mount_page(
        &mock_server,
        "/page1",
        r#"<html><head><title>Page 1</title></head><body>
        <a href="/">Home</a><a href="/page2">Page 2</a></body></html>"#
            .to_string(),
    )
    .await;
    mount_page(
        &mock_server,
        "/page2",
        r#"<html><head><title>Page 2</title></head><body>Content 2</body></html>"#.to_string(),
    )
    .await;

    let db_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = create_pool(&db_dir, test_workers_config(10));
    pool.dispatcher()
        .submit(&format!("{}/", base_url), 10)
        .expect("Failed to submit seed");

    pool.start(2);
    wait_for_idle(&pool, 3).await;
    let stats = pool.stop().await;

    let dispatcher = pool.dispatcher();
    for page in ["/", "/page1", "/page2"] {
        let entry = dispatcher
            .entry(&format!("{}{}", base_url, page))
            .expect("Failed to read entry")
            .unwrap_or_else(|| panic!("{} was never queued", page));
        assert_eq!(entry.state, EntryState::Done, "{} not done", page);
    }

    // Other hosts are filtered by the processor, revisits by the ledger
    let queue = dispatcher.stats().expect("Failed to read stats");
    assert_eq!(queue.done, 3);
    assert_eq!(queue.failed, 0);
    assert_eq!(queue.total_visits, 3);
    assert!(dispatcher
        .entry("https://elsewhere.test/")
        .expect("Failed to read entry")
        .is_none());

    assert_eq!(stats.total_processed(), 3);
    assert_eq!(stats.total_failed(), 0);
    let fetches: usize = stats
        .workers
        .iter()
        .filter_map(|w| w.step_timings.get(&Step::Fetch))
        .map(|s| s.count)
        .sum();
    assert_eq!(fetches, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_page_times_out_and_fails() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>late</body></html>", "text/html")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().expect("Failed to create temp dir");
    let mut workers = test_workers_config(1);
    workers.count = 1;
    let pool = create_pool(&db_dir, workers);

    let url = format!("{}/slow", mock_server.uri());
    pool.dispatcher().submit(&url, 0).expect("Failed to submit");

    pool.start(1);
    wait_for_idle(&pool, 1).await;
    let stats = pool.stop().await;

    let entry = pool
        .dispatcher()
        .entry(&url)
        .expect("Failed to read entry")
        .expect("entry missing");
    assert_eq!(entry.state, EntryState::Failed);
    assert!(entry
        .last_error
        .as_deref()
        .unwrap_or_default()
        .starts_with("Timeout"));
    assert_eq!(pool.dispatcher().size().expect("Failed to read size"), 0);

    assert_eq!(stats.total_failed(), 1);
    let timing = &stats.workers[0].recent_timings[0];
    assert_eq!(timing.url, url);
    assert!(timing.error.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_error_marks_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let db_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = create_pool(&db_dir, test_workers_config(10));

    let url = format!("{}/gone", mock_server.uri());
    pool.dispatcher().submit(&url, 0).expect("Failed to submit");

    pool.start(1);
    wait_for_idle(&pool, 1).await;
    pool.stop().await;

    let entry = pool
        .dispatcher()
        .entry(&url)
        .expect("Failed to read entry")
        .expect("entry missing");
    assert_eq!(entry.state, EntryState::Failed);
    assert_eq!(entry.last_error.as_deref(), Some("HTTP 404"));
}
