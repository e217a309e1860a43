//! Staging table operations.
//!
//! Every leaf ingested during a run lands here exactly once per identity;
//! the all-columns primary key turns duplicate writes (same certificate in
//! two logs, or a re-ingested range after a crash) into no-ops.

use sqlx::postgres::PgConnection;
use sqlx::PgPool;

use super::Result;
use crate::cert::CertInfo;

const INSERT_STAGED: &str = "\
    INSERT INTO downloaded (cn, dn, serial_number, san, not_before, not_after, issuer) \
    VALUES ($1, $2, $3, $4, $5, $6, $7) \
    ON CONFLICT DO NOTHING";

/// Write one certificate into the staging buffer. Conflicts are silently
/// ignored; that is the idempotence contract.
///
/// Takes a plain connection rather than the pool so the inserter can keep a
/// single connection (and its cached prepared statement) for its lifetime.
pub async fn insert_staged(conn: &mut PgConnection, info: &CertInfo) -> Result<()> {
    sqlx::query(INSERT_STAGED)
        .bind(&info.cn)
        .bind(&info.dn)
        .bind(&info.serial)
        .bind(&info.san)
        .bind(&info.not_before)
        .bind(&info.not_after)
        .bind(&info.issuer)
        .execute(conn)
        .await?;
    Ok(())
}

/// Number of distinct certificates staged so far this run.
pub async fn staged_count(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM downloaded")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Identity subset served to the dump file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StagedIdentity {
    pub cn: String,
    pub san: String,
    pub not_before: String,
    pub not_after: String,
}

/// All staged rows, trimmed to the fields the dump file carries.
pub async fn staged_identities(pool: &PgPool) -> Result<Vec<StagedIdentity>> {
    let rows = sqlx::query_as::<_, StagedIdentity>(
        "SELECT cn, san, not_before, not_after FROM downloaded",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
