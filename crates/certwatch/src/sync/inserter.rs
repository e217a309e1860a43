//! The single staging writer.

use sqlx::PgPool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cert::CertInfo;
use crate::store::{self, staging};

/// Drain the insert queue into the staging table. Row-level database errors
/// are logged and skipped; connection-level errors are fatal and abort the
/// run (the caller reacts by not promoting).
pub async fn run_inserter(
    pool: PgPool,
    mut rx: mpsc::Receiver<CertInfo>,
    stored: Arc<AtomicU64>,
) -> store::Result<u64> {
    // One connection for the whole drain keeps the statement prepared once.
    let mut conn = pool.acquire().await?;
    let mut count = 0u64;

    while let Some(info) = rx.recv().await {
        match staging::insert_staged(&mut conn, &info).await {
            Ok(()) => {
                count += 1;
                stored.fetch_add(1, Ordering::Relaxed);
            }
            Err(store::StoreError::Database(sqlx::Error::Database(db_err))) => {
                warn!(
                    cn = %info.cn,
                    serial = %info.serial,
                    error = %db_err,
                    "failed to stage certificate, skipping"
                );
            }
            Err(err) => return Err(err),
        }
    }

    info!(inserted = count, "staging writer drained");
    Ok(count)
}
