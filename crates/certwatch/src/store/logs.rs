//! Log head bookkeeping and the two-phase head promotion.
//!
//! During a run, new head indices are staged into `tmp_ctlog`, a run-scoped
//! copy of `ctlog`. Only when the whole run has drained cleanly is `ctlog`
//! replaced by the shadow table in a single transaction. A crash before the
//! swap leaves `ctlog` untouched, so the next run re-ingests the same range
//! and the staging primary key absorbs the duplicates.

use sqlx::PgPool;
use tracing::{debug, info};

use super::Result;

/// One row of the `ctlog` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LogHead {
    pub url: String,
    pub head_index: i64,
}

/// All known logs with their last-ingested indices.
pub async fn all_logs(pool: &PgPool) -> Result<Vec<LogHead>> {
    let logs = sqlx::query_as::<_, LogHead>("SELECT url, head_index FROM ctlog ORDER BY url")
        .fetch_all(pool)
        .await?;
    Ok(logs)
}

/// Register a log, leaving an existing row alone.
pub async fn add_log(pool: &PgPool, url: &str, head_index: i64) -> Result<()> {
    sqlx::query("INSERT INTO ctlog (url, head_index) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(url)
        .bind(head_index)
        .execute(pool)
        .await?;
    Ok(())
}

/// Prepare the run: empty the staging buffer and rebuild the shadow head
/// table from the current `ctlog`. Any shadow left over from an aborted run
/// is discarded here, which is what keeps un-promoted runs invisible.
pub async fn prepare_staging(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("TRUNCATE downloaded").execute(&mut *tx).await?;
    sqlx::query("DROP TABLE IF EXISTS tmp_ctlog")
        .execute(&mut *tx)
        .await?;
    sqlx::query("CREATE TABLE tmp_ctlog (LIKE ctlog INCLUDING ALL)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO tmp_ctlog SELECT * FROM ctlog")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!("staging prepared: downloaded truncated, tmp_ctlog rebuilt");
    Ok(())
}

/// Stage a new head index for one log in the shadow table. The guard keeps
/// heads monotone even if a caller hands us a stale tree size.
pub async fn stage_head(pool: &PgPool, url: &str, head_index: i64) -> Result<()> {
    let result =
        sqlx::query("UPDATE tmp_ctlog SET head_index = $1 WHERE url = $2 AND head_index <= $1")
            .bind(head_index)
            .bind(url)
            .execute(pool)
            .await?;

    debug!(
        url = %url,
        head_index = head_index,
        updated = result.rows_affected(),
        "staged head index"
    );
    Ok(())
}

/// Atomically replace `ctlog` with the staged shadow table.
pub async fn promote_heads(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DROP TABLE ctlog").execute(&mut *tx).await?;
    sqlx::query("ALTER TABLE tmp_ctlog RENAME TO ctlog")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!("log head indices promoted");
    Ok(())
}
