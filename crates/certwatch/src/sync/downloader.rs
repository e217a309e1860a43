//! Batch downloader with adaptive cursor progression.
//!
//! Logs cap the number of entries per get-entries response at an opaque,
//! operator-chosen limit, so the cursor advances by however many entries
//! actually came back rather than by the requested width. Assuming a fixed
//! width would either skip leaves or spin forever.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::BatchRequest;
use crate::config::SyncConfig;
use crate::ctlog::{EntrySource, LogEntry};

/// Outcome of one batch, fed into the promotion policy: a log with any
/// failed batch keeps its old head index this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub url: String,
    pub completed: bool,
}

/// Downloads one batch, forwarding every fetched leaf to the parse queue.
pub struct Downloader {
    source: Arc<dyn EntrySource>,
    retry_wait: Duration,
    throttle: Duration,
    max_attempts: u32,
}

impl Downloader {
    pub fn new(source: Arc<dyn EntrySource>, config: &SyncConfig) -> Self {
        Self {
            source,
            retry_wait: Duration::from_secs(config.retry_wait_secs),
            throttle: Duration::from_secs(config.batch_throttle_secs),
            max_attempts: config.batch_attempts,
        }
    }

    /// Drive the cursor across `[start, end]`. Returns the batch outcome;
    /// an abandoned batch is logged but never aborts the run.
    pub async fn run(&self, batch: BatchRequest, tx: mpsc::Sender<LogEntry>) -> BatchOutcome {
        let mut cursor = batch.start;

        while cursor <= batch.end {
            let entries = match self.fetch_with_retry(&batch, cursor).await {
                Some(entries) => entries,
                None => {
                    info!(
                        url = %batch.url,
                        start = batch.start,
                        end = batch.end,
                        cursor = cursor,
                        "abandoning batch after retry budget"
                    );
                    return BatchOutcome {
                        url: batch.url,
                        completed: false,
                    };
                }
            };

            let count = entries.len() as i64;
            debug!(url = %batch.url, cursor = cursor, count = count, "fetched entries");

            for entry in entries {
                if tx.send(entry).await.is_err() {
                    warn!(url = %batch.url, "parse queue closed, abandoning batch");
                    return BatchOutcome {
                        url: batch.url,
                        completed: false,
                    };
                }
            }

            cursor += count;

            // Soft per-batch throttle between requests to the same log.
            if cursor <= batch.end {
                sleep(self.throttle).await;
            }
        }

        BatchOutcome {
            url: batch.url,
            completed: true,
        }
    }

    /// One cursor step with linear backoff. An empty entry list counts as a
    /// failure: the range is known non-empty, so an empty response is the
    /// log misbehaving, and honoring it would loop forever.
    async fn fetch_with_retry(&self, batch: &BatchRequest, cursor: i64) -> Option<Vec<LogEntry>> {
        let mut attempts = 0u32;

        loop {
            let result = self.source.entries(&batch.url, cursor, batch.end).await;

            match result {
                Ok(entries) if !entries.is_empty() => return Some(entries),
                Ok(_) => {
                    attempts += 1;
                    if attempts >= self.max_attempts {
                        warn!(url = %batch.url, cursor = cursor, "log kept returning zero entries");
                        return None;
                    }
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= self.max_attempts {
                        warn!(
                            url = %batch.url,
                            cursor = cursor,
                            attempts = attempts,
                            error = %err,
                            "entry fetch failed, retry budget exhausted"
                        );
                        return None;
                    }
                    if err.is_quiet() {
                        debug!(url = %batch.url, cursor = cursor, attempt = attempts, "throttled by log");
                    } else {
                        warn!(
                            url = %batch.url,
                            cursor = cursor,
                            attempt = attempts,
                            error = %err,
                            "entry fetch failed, retrying"
                        );
                    }
                }
            }

            sleep(self.retry_wait * attempts).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctlog::{CtError, Result as CtResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn leaf(n: u8) -> LogEntry {
        LogEntry {
            leaf_input: vec![n],
            extra_data: Vec::new(),
        }
    }

    /// Returns at most `per_request` entries regardless of the asked range
    /// and records every cursor it was asked for.
    struct CappedSource {
        per_request: i64,
        cursors: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EntrySource for CappedSource {
        async fn entries(&self, _url: &str, start: i64, end: i64) -> CtResult<Vec<LogEntry>> {
            self.cursors.lock().unwrap().push(start);
            let n = (end - start + 1).min(self.per_request);
            Ok((0..n).map(|i| leaf((start + i) as u8)).collect())
        }
    }

    /// Fails every request.
    struct BrokenSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EntrySource for BrokenSource {
        async fn entries(&self, _url: &str, _start: i64, _end: i64) -> CtResult<Vec<LogEntry>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(CtError::Rejected("rate limit exceeded".into()))
        }
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            batch_throttle_secs: 0,
            retry_wait_secs: 0,
            ..SyncConfig::default()
        }
    }

    fn batch(start: i64, end: i64) -> BatchRequest {
        BatchRequest {
            url: "https://ct.example.org/".to_string(),
            start,
            end,
        }
    }

    #[tokio::test]
    async fn adaptive_progression_with_capped_responses() {
        let source = Arc::new(CappedSource {
            per_request: 3,
            cursors: Mutex::new(Vec::new()),
        });
        let downloader = Downloader::new(source.clone(), &test_config());
        let (tx, mut rx) = mpsc::channel(64);

        let outcome = downloader.run(batch(1, 10), tx).await;
        assert!(outcome.completed);

        // cursor walks 1, 4, 7, 10 even though each request asks for the
        // whole remaining range
        assert_eq!(*source.cursors.lock().unwrap(), vec![1, 4, 7, 10]);

        let mut received = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            received.push(entry.leaf_input[0]);
        }
        assert_eq!(received, (1..=10).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn exact_width_response_finishes_in_one_request() {
        let source = Arc::new(CappedSource {
            per_request: 100,
            cursors: Mutex::new(Vec::new()),
        });
        let downloader = Downloader::new(source.clone(), &test_config());
        let (tx, mut rx) = mpsc::channel(64);

        let outcome = downloader.run(batch(5, 9), tx).await;
        assert!(outcome.completed);
        assert_eq!(*source.cursors.lock().unwrap(), vec![5]);

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn persistent_failure_abandons_after_retry_budget() {
        let source = Arc::new(BrokenSource {
            calls: AtomicU32::new(0),
        });
        let downloader = Downloader::new(source.clone(), &test_config());
        let (tx, _rx) = mpsc::channel(64);

        let outcome = downloader.run(batch(1, 100), tx).await;
        assert!(!outcome.completed);
        assert_eq!(source.calls.load(Ordering::Relaxed), 10);
    }
}
