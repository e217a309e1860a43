//! Integration tests against an in-process mock CT log.
//!
//! The mock speaks just enough of the RFC 6962 HTTP surface for the client
//! and downloader to be exercised end to end: get-sth, get-entries with an
//! operator-chosen per-request cap, the JSON error envelope, and the HTML
//! throttle page some operators serve.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use certwatch::config::SyncConfig;
use certwatch::ctlog::{CtClient, CtError};
use certwatch::store::LogHead;
use certwatch::sync::distributor;
use certwatch::sync::downloader::Downloader;
use certwatch::sync::heads;

#[derive(Clone, Copy)]
enum Behavior {
    Normal,
    ErrorEnvelope,
    HtmlThrottle,
    /// Fail the first N requests with an envelope, then behave normally.
    FlakyUntil(u32),
}

struct MockLog {
    tree_size: i64,
    per_request: i64,
    behavior: Behavior,
    requests: AtomicU32,
    cursors: Mutex<Vec<i64>>,
}

impl MockLog {
    fn new(tree_size: i64, per_request: i64, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            tree_size,
            per_request,
            behavior,
            requests: AtomicU32::new(0),
            cursors: Mutex::new(Vec::new()),
        })
    }
}

#[derive(Deserialize)]
struct EntriesParams {
    start: i64,
    end: i64,
}

/// Synthetic but structurally valid v1 x509 leaf, tagged with its index.
fn leaf_bytes(index: i64) -> Vec<u8> {
    let payload = format!("leaf-{index}").into_bytes();
    let mut buf = vec![0u8, 0u8];
    buf.extend_from_slice(&(index as u64).to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf
}

async fn get_sth(State(log): State<Arc<MockLog>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "tree_size": log.tree_size,
        "timestamp": 1_711_290_954_479u64,
        "sha256_root_hash": "AAAA",
        "tree_head_signature": "BBBB",
    }))
}

async fn get_entries(
    State(log): State<Arc<MockLog>>,
    Query(params): Query<EntriesParams>,
) -> Response {
    let n = log.requests.fetch_add(1, Ordering::SeqCst);
    log.cursors.lock().unwrap().push(params.start);

    let failing = match log.behavior {
        Behavior::Normal => false,
        Behavior::ErrorEnvelope => true,
        Behavior::HtmlThrottle => {
            return axum::response::Html("<html><body>429 Too Many Requests</body></html>")
                .into_response();
        }
        Behavior::FlakyUntil(limit) => n < limit,
    };

    if failing {
        return Json(serde_json::json!({
            "error_message": "rate limit exceeded, try again later",
            "success": false,
        }))
        .into_response();
    }

    let end = params.end.min(log.tree_size - 1);
    let count = (end - params.start + 1).min(log.per_request).max(0);
    let entries: Vec<serde_json::Value> = (params.start..params.start + count)
        .map(|i| {
            serde_json::json!({
                "leaf_input": BASE64.encode(leaf_bytes(i)),
                "extra_data": "",
            })
        })
        .collect();

    Json(serde_json::json!({ "entries": entries })).into_response()
}

async fn spawn_log(log: Arc<MockLog>) -> String {
    let app = Router::new()
        .route("/ct/v1/get-sth", get(get_sth))
        .route("/ct/v1/get-entries", get(get_entries))
        .with_state(log);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/")
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        retry_wait_secs: 0,
        batch_throttle_secs: 0,
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn sth_fetch_reads_tree_size() {
    let url = spawn_log(MockLog::new(1234, 10, Behavior::Normal)).await;
    let client = CtClient::new(5).unwrap();

    let sth = client.get_sth(&url).await.unwrap();
    assert_eq!(sth.tree_size, 1234);
}

#[tokio::test]
async fn entries_are_decoded_and_capped() {
    let url = spawn_log(MockLog::new(100, 3, Behavior::Normal)).await;
    let client = CtClient::new(5).unwrap();

    let entries = client.get_entries(&url, 0, 50).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].leaf_input, leaf_bytes(0));
    assert_eq!(entries[2].leaf_input, leaf_bytes(2));
}

#[tokio::test]
async fn error_envelope_is_a_quiet_rejection() {
    let url = spawn_log(MockLog::new(100, 10, Behavior::ErrorEnvelope)).await;
    let client = CtClient::new(5).unwrap();

    let err = client.get_entries(&url, 0, 5).await.unwrap_err();
    match &err {
        CtError::Rejected(msg) => assert!(msg.contains("rate limit")),
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(err.is_quiet());
}

#[tokio::test]
async fn html_throttle_page_is_opaque() {
    let url = spawn_log(MockLog::new(100, 10, Behavior::HtmlThrottle)).await;
    let client = CtClient::new(5).unwrap();

    let err = client.get_entries(&url, 0, 5).await.unwrap_err();
    assert!(matches!(err, CtError::Opaque(_)));
    assert!(err.is_quiet());
}

#[tokio::test]
async fn downloader_advances_adaptively_over_http() {
    // Three entries per response regardless of the requested width: the
    // cursor has to walk 1, 4, 7, 10 and still terminate.
    let log = MockLog::new(100, 3, Behavior::Normal);
    let url = spawn_log(log.clone()).await;

    let client = Arc::new(CtClient::new(5).unwrap());
    let downloader = Downloader::new(client, &fast_config());
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);

    let outcome = downloader
        .run(
            certwatch::sync::BatchRequest {
                url,
                start: 1,
                end: 10,
            },
            tx,
        )
        .await;

    assert!(outcome.completed);
    assert_eq!(*log.cursors.lock().unwrap(), vec![1, 4, 7, 10]);

    let mut received = 0;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 10);
}

#[tokio::test]
async fn downloader_retries_through_transient_envelopes() {
    let log = MockLog::new(100, 100, Behavior::FlakyUntil(3));
    let url = spawn_log(log.clone()).await;

    let client = Arc::new(CtClient::new(5).unwrap());
    let downloader = Downloader::new(client, &fast_config());
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);

    let outcome = downloader
        .run(
            certwatch::sync::BatchRequest {
                url,
                start: 0,
                end: 4,
            },
            tx,
        )
        .await;

    assert!(outcome.completed);
    assert!(log.requests.load(Ordering::SeqCst) >= 4);

    let mut received = 0;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 5);
}

#[tokio::test]
async fn empty_range_produces_no_batches_and_no_requests() {
    // Head already at tree_size - 1: the distributor terminates immediately.
    let log = MockLog::new(100, 10, Behavior::Normal);
    let url = spawn_log(log.clone()).await;

    let client = CtClient::new(5).unwrap();
    let known = vec![LogHead {
        url: url.clone(),
        head_index: 99,
    }];

    let runs = heads::discover(&client, &known, &fast_config()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].is_empty());
    assert!(distributor::batches(&runs[0], 4).is_empty());
    assert_eq!(log.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fresh_log_flows_every_leaf_into_the_parse_queue() {
    // Head 0, tree_size 10, four downloaders: batches [1,3], [4,6], [7,9]
    // and exactly nine leaves on the queue.
    let log = MockLog::new(10, 100, Behavior::Normal);
    let url = spawn_log(log.clone()).await;

    let client = Arc::new(CtClient::new(5).unwrap());
    let known = vec![LogHead {
        url: url.clone(),
        head_index: 0,
    }];

    let runs = heads::discover(client.as_ref(), &known, &fast_config())
        .await
        .unwrap();
    let batches = distributor::batches(&runs[0], 4);
    assert_eq!(batches.len(), 3);
    assert_eq!((batches[0].start, batches[0].end), (1, 3));
    assert_eq!((batches[2].start, batches[2].end), (7, 9));

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let mut handles = Vec::new();
    for batch in batches {
        let downloader = Downloader::new(
            client.clone() as Arc<dyn certwatch::ctlog::EntrySource>,
            &fast_config(),
        );
        let tx = tx.clone();
        handles.push(tokio::spawn(async move { downloader.run(batch, tx).await }));
    }
    drop(tx);

    for handle in handles {
        assert!(handle.await.unwrap().completed);
    }

    let mut indices = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        let leaf = certwatch::ctlog::MerkleTreeLeaf::parse(&entry.leaf_input).unwrap();
        indices.push(leaf.timestamp as i64);
    }
    indices.sort_unstable();
    assert_eq!(indices, (1..=9).collect::<Vec<i64>>());
}
