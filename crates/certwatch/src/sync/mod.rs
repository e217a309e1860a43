// Incremental sync pipeline.
//
// One run moves every known log from its persisted head index to the tree
// size observed at run start:
//
//   [heads] -> [distributor] -> [downloaders] -> parse queue
//                                                   -> [parsers] -> insert queue
//                                                                      -> [inserter]
//   then: dump, match + notify, head promotion, expiry GC
//
// Stages exchange owned records over bounded queues; the only shared
// mutable state is a pair of relaxed atomic progress counters. Nothing is
// promoted unless the whole graph drains cleanly.

pub mod distributor;
pub mod downloader;
pub mod heads;
pub mod inserter;
pub mod parser;
pub mod pipeline;

pub use pipeline::{RunStats, SyncPipeline};

use crate::ctlog::CtError;
use crate::store::StoreError;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error types that abort a run. Everything else is handled locally with
/// retries or by abandoning a single batch.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("head discovery failed for {url}: {source}")]
    HeadFetch { url: String, source: CtError },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("pipeline worker panicked: {0}")]
    WorkerPanic(String),
}

/// Per-log work order produced by head discovery: ingest the half-open
/// index range `(old, new]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRun {
    pub url: String,
    pub old: i64,
    pub new: i64,
}

impl LogRun {
    /// Number of leaves this run covers.
    pub fn len(&self) -> i64 {
        (self.new - self.old).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A contiguous inclusive index range `[start, end]` owned by exactly one
/// downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub url: String,
    pub start: i64,
    pub end: i64,
}
