//! Parser workers: raw leaves in, [`CertInfo`] records out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cert::{plausible_cn, CertInfo};
use crate::ctlog::{LogEntry, MerkleTreeLeaf};

/// Drain the shared parse queue until the downloaders close it.
///
/// The receiver sits behind a mutex so a pool of workers can compete for
/// entries; the lock is only held across the dequeue, never while decoding.
pub async fn run_parser(
    rx: Arc<Mutex<mpsc::Receiver<LogEntry>>>,
    tx: mpsc::Sender<CertInfo>,
    accepted: Arc<AtomicU64>,
) {
    loop {
        let entry = {
            let mut queue = rx.lock().await;
            queue.recv().await
        };
        let Some(entry) = entry else {
            break;
        };

        let leaf = match MerkleTreeLeaf::parse(&entry.leaf_input) {
            Ok(leaf) => leaf,
            Err(err) => {
                warn!(error = %err, "dropping undecodable leaf");
                continue;
            }
        };

        let info = match CertInfo::from_payload(&leaf.payload) {
            Ok(info) => info,
            Err(err) => {
                warn!(error = %err, "dropping unparseable certificate");
                continue;
            }
        };

        if !plausible_cn(&info.cn) {
            debug!(cn = %info.cn, "dropping implausible common name");
            continue;
        }

        accepted.fetch_add(1, Ordering::Relaxed);

        if tx.send(info).await.is_err() {
            // Inserter is gone; nothing left to do for this worker.
            break;
        }
    }
}
