//! certwatch library
//!
//! Ingests X.509 certificates from public Certificate Transparency logs,
//! persists their identity fields, and notifies registered observers when a
//! newly logged certificate matches a monitored domain.
//!
//! # Architecture
//!
//! The core is an incremental-sync pipeline run as a batch:
//!
//! - `sync::heads` discovers, per log, how far the log has advanced since
//!   the last promoted head index
//! - `sync::distributor` tiles each pending range into parallel batches
//! - `sync::downloader` fetches leaves with retry, backpressure and an
//!   adaptive cursor
//! - `sync::parser` decodes leaves into [`cert::CertInfo`] records
//! - `sync::inserter` stages records idempotently in PostgreSQL
//! - after a clean drain, staged rows are matched against monitors,
//!   archived, notified, and the per-log head indices are promoted in one
//!   atomic table swap
//!
//! # Example
//!
//! ```no_run
//! use certwatch::config::Config;
//! use certwatch::ctlog::CtClient;
//! use certwatch::sync::SyncPipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = certwatch::store::connect("postgresql://localhost/certwatch").await?;
//!     let client = CtClient::new(config.sync.http_timeout_secs)?;
//!     let pipeline = SyncPipeline::new(pool, client, config.sync, None, None);
//!     pipeline.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cert;
pub mod config;
pub mod ctlog;
pub mod dump;
pub mod notify;
pub mod store;
pub mod sync;
