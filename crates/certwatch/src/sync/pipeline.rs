//! Run orchestration: wires the stages together, enforces the drain order,
//! and runs the post-ingest phase (dump, match, notify, promote, GC).
//!
//! Shutdown barrier, in order: distributors finish spawning, downloaders
//! join, the parse queue closes, parsers join, the insert queue closes, the
//! inserter drains. Only then does anything externally visible happen.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use super::{distributor, downloader::Downloader, heads, inserter, parser, Result, SyncError};
use crate::config::SyncConfig;
use crate::ctlog::CtClient;
use crate::dump;
use crate::notify::Notifier;
use crate::store::{certs, logs, staging};

/// Counters and totals reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub logs_scanned: usize,
    pub batches: usize,
    pub batches_failed: usize,
    pub certs_accepted: u64,
    pub certs_staged: u64,
    pub groups_notified: usize,
    pub certs_expired: u64,
}

/// The incremental-sync engine.
pub struct SyncPipeline {
    pool: PgPool,
    client: CtClient,
    config: SyncConfig,
    notifier: Option<Arc<dyn Notifier>>,
    dump_path: Option<PathBuf>,
}

impl SyncPipeline {
    pub fn new(
        pool: PgPool,
        client: CtClient,
        config: SyncConfig,
        notifier: Option<Arc<dyn Notifier>>,
        dump_path: Option<PathBuf>,
    ) -> Self {
        Self {
            pool,
            client,
            config,
            notifier,
            dump_path,
        }
    }

    /// Execute one full run. Returns the run statistics; any error means
    /// the run aborted before promotion and the head indices are unchanged.
    pub async fn run(&self) -> Result<RunStats> {
        let mut stats = RunStats::default();

        // 1. Head discovery against the persisted log table.
        let known = logs::all_logs(&self.pool).await?;
        if known.is_empty() {
            warn!("no logs registered, nothing to do");
            return Ok(stats);
        }
        let runs = heads::discover(&self.client, &known, &self.config).await?;
        stats.logs_scanned = runs.len();

        // 2. Staging prepare, before any download starts.
        logs::prepare_staging(&self.pool).await?;

        // 3. Build the stage graph.
        let (parse_tx, parse_rx) = mpsc::channel(self.config.parse_queue_capacity);
        let (insert_tx, insert_rx) = mpsc::channel(self.config.insert_queue_capacity);
        let accepted = Arc::new(AtomicU64::new(0));
        let stored = Arc::new(AtomicU64::new(0));

        let parse_rx = Arc::new(Mutex::new(parse_rx));
        let mut parser_handles = Vec::with_capacity(self.config.parsers);
        for _ in 0..self.config.parsers {
            parser_handles.push(tokio::spawn(parser::run_parser(
                parse_rx.clone(),
                insert_tx.clone(),
                accepted.clone(),
            )));
        }
        // The pipeline keeps no insert sender of its own; once the parsers
        // are done, the queue closes.
        drop(insert_tx);

        let inserter_handle = tokio::spawn(inserter::run_inserter(
            self.pool.clone(),
            insert_rx,
            stored.clone(),
        ));

        // 4. One distributor per log fans out into downloaders.
        let source: Arc<dyn crate::ctlog::EntrySource> = Arc::new(self.client.clone());
        let mut download_handles = Vec::new();
        for run in &runs {
            for batch in distributor::batches(run, self.config.downloaders_per_log) {
                let worker = Downloader::new(source.clone(), &self.config);
                let tx = parse_tx.clone();
                download_handles.push(tokio::spawn(async move { worker.run(batch, tx).await }));
            }
        }
        drop(parse_tx);
        stats.batches = download_handles.len();
        info!(
            logs = runs.len(),
            batches = stats.batches,
            "downloaders launched"
        );

        // 5. Drain barrier: downloaders, then parsers, then the inserter.
        let mut failed_logs: HashSet<String> = HashSet::new();
        for handle in download_handles {
            let outcome = handle
                .await
                .map_err(|e| SyncError::WorkerPanic(e.to_string()))?;
            if !outcome.completed {
                stats.batches_failed += 1;
                failed_logs.insert(outcome.url);
            }
        }

        for handle in parser_handles {
            handle
                .await
                .map_err(|e| SyncError::WorkerPanic(e.to_string()))?;
        }

        stats.certs_staged = inserter_handle
            .await
            .map_err(|e| SyncError::WorkerPanic(e.to_string()))??;
        stats.certs_accepted = accepted.load(Ordering::Relaxed);

        let distinct = staging::staged_count(&self.pool).await?;
        info!(
            accepted = stats.certs_accepted,
            staged = stats.certs_staged,
            distinct = distinct,
            failed_batches = stats.batches_failed,
            "ingest drained"
        );

        // 6. Stage head updates for every log with a clean run. A failed
        // batch leaves its log at the old head, so the next run re-ingests
        // the missing range.
        for run in &runs {
            if run.is_empty() {
                continue;
            }
            if failed_logs.contains(&run.url) {
                warn!(url = %run.url, "batch failures, head not staged this run");
                continue;
            }
            logs::stage_head(&self.pool, &run.url, run.new).await?;
        }

        // 7. Optional JSONL dump for API consumption.
        if let Some(path) = &self.dump_path {
            let rows = staging::staged_identities(&self.pool).await?;
            match dump::write_dump(path, &rows) {
                Ok(written) => info!(path = %path.display(), rows = written, "dump file written"),
                Err(err) => error!(path = %path.display(), error = %err, "dump file failed"),
            }
        }

        // 8. Match, archive and notify.
        let groups = certs::archive_matches(&self.pool).await?;
        stats.groups_notified = groups.len();
        if let Some(notifier) = &self.notifier {
            for group in &groups {
                if let Err(err) = notifier.send(group).await {
                    // Delivery failures never roll back the archive.
                    error!(
                        email = %group.email,
                        channel = notifier.channel_name(),
                        error = %err,
                        "notification delivery failed"
                    );
                }
            }
        } else if !groups.is_empty() {
            info!(groups = groups.len(), "notifications disabled, matches archived only");
        }

        // 9. Promote the heads vector, then prune expired certificates.
        logs::promote_heads(&self.pool).await?;
        stats.certs_expired = certs::delete_expired(&self.pool).await?;

        info!(
            logs = stats.logs_scanned,
            batches = stats.batches,
            failed_batches = stats.batches_failed,
            accepted = stats.certs_accepted,
            staged = stats.certs_staged,
            groups = stats.groups_notified,
            expired = stats.certs_expired,
            "run complete"
        );

        Ok(stats)
    }
}
