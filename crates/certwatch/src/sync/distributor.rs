//! Splitting one log's pending range into downloader batches.

use super::{BatchRequest, LogRun};

/// Tile the half-open range `(old, new]` into at most `downloaders`
/// contiguous inclusive batches. The batch width is the ceiling division of
/// the range over the downloader count, so the tail batch may be shorter
/// and trailing empty tiles are dropped.
pub fn batches(run: &LogRun, downloaders: i64) -> Vec<BatchRequest> {
    if run.is_empty() || downloaders <= 0 {
        return Vec::new();
    }

    let total = run.new - run.old;
    let size = (total + downloaders - 1) / downloaders;
    let mut out = Vec::new();

    for i in 0..downloaders {
        let start = run.old + 1 + i * size;
        if start > run.new {
            break;
        }
        out.push(BatchRequest {
            url: run.url.clone(),
            start,
            end: (run.old + (i + 1) * size).min(run.new),
        });
    }

    out
}
