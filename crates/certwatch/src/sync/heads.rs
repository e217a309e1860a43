//! Head discovery: compare each log's persisted head index against a fresh
//! Signed Tree Head to find out how far the run has to catch up.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{LogRun, Result, SyncError};
use crate::config::SyncConfig;
use crate::ctlog::CtClient;
use crate::store::LogHead;

/// Fetch the current tree size of every log and produce one [`LogRun`] per
/// log. Transient fetch failures back off linearly; a log that keeps
/// failing past the attempt budget aborts the whole run, because promoting
/// a partial heads vector is worse than retrying the run later.
pub async fn discover(
    client: &CtClient,
    logs: &[LogHead],
    config: &SyncConfig,
) -> Result<Vec<LogRun>> {
    let mut runs = Vec::with_capacity(logs.len());

    for log in logs {
        let sth = fetch_sth_with_backoff(client, &log.url, config).await?;
        let run = LogRun {
            url: log.url.clone(),
            old: log.head_index,
            new: sth.tree_size - 1,
        };

        info!(
            url = %run.url,
            old = run.old,
            new = run.new,
            pending = run.len(),
            "discovered log head"
        );
        runs.push(run);
    }

    let total: i64 = runs.iter().map(LogRun::len).sum();
    info!(logs = runs.len(), pending = total, "head discovery complete");

    Ok(runs)
}

async fn fetch_sth_with_backoff(
    client: &CtClient,
    url: &str,
    config: &SyncConfig,
) -> Result<crate::ctlog::Sth> {
    let mut attempt = 0u32;
    loop {
        match client.get_sth(url).await {
            Ok(sth) => return Ok(sth),
            Err(source) => {
                attempt += 1;
                if attempt >= config.head_attempts {
                    return Err(SyncError::HeadFetch {
                        url: url.to_string(),
                        source,
                    });
                }
                warn!(
                    url = %url,
                    attempt = attempt,
                    error = %source,
                    "sth fetch failed, backing off"
                );
                sleep(Duration::from_secs(
                    config.retry_wait_secs * u64::from(attempt),
                ))
                .await;
            }
        }
    }
}
