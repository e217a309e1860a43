// Relational store (PostgreSQL via sqlx).
//
// Table roles:
// - ctlog:       per-log head indices, advanced only by run promotion
// - tmp_ctlog:   run-scoped shadow of ctlog absorbing staged head updates
// - downloaded:  per-run staging buffer with an identity-wide primary key,
//                which is what makes re-ingestion after a crash idempotent
// - certificate: permanent deduplicated store of matched certificates
// - monitor:     (email, domain) subscriptions

pub mod certs;
pub mod logs;
pub mod monitors;
pub mod staging;

pub use certs::MatchGroup;
pub use logs::LogHead;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error types for the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("not a valid email address: {0}")]
    InvalidEmail(String),

    #[error("not a valid domain name: {0}")]
    InvalidDomain(String),
}

/// Default connection pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Open the connection pool and bring the schema up to date.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database pool established, schema up to date");

    Ok(pool)
}
