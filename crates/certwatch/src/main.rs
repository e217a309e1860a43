//! certwatch - CT log scanner and domain monitor CLI

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use certwatch::config::{Config, NotifyTransport};
use certwatch::ctlog::CtClient;
use certwatch::notify::{Notifier, SendmailNotifier, SmtpNotifier};
use certwatch::store;
use certwatch::sync::SyncPipeline;
use certwatch_common::logging::{init_logging, LogConfig};

#[derive(Parser, Debug)]
#[command(name = "certwatch")]
#[command(version, about = "Downloads certificates from Certificate Transparency logs and filters them")]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long = "db")]
    db: String,

    /// Do not run the scan
    #[arg(long)]
    norun: bool,

    /// Dump the downloaded certificates to a JSONL file
    #[arg(long)]
    dump: bool,

    /// Override the dump file location
    #[arg(long)]
    dump_path: Option<PathBuf>,

    /// Add monitors: "email domain [domain ...]"
    #[arg(long)]
    add: Option<String>,

    /// Remove one monitor: "email domain"
    #[arg(long)]
    remove: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Normalize collation-sensitive text comparisons in the SQL layer.
    std::env::set_var("LC_ALL", "C");
    dotenvy::dotenv().ok();

    let log_config = LogConfig::from_env().unwrap_or_else(|_| {
        LogConfig::builder()
            .log_file_prefix("certwatch".to_string())
            .build()
    });
    init_logging(&log_config)?;

    let cli = Cli::parse();
    let config = Config::load()?;

    let pool = store::connect(&cli.db)
        .await
        .context("failed to open database")?;

    if let Some(arg) = &cli.add {
        let mut parts = arg.split_whitespace();
        let Some(email) = parts.next() else {
            bail!("--add expects \"email domain [domain ...]\"");
        };
        let domains: Vec<String> = parts.map(str::to_string).collect();
        if domains.is_empty() {
            bail!("--add expects at least one domain after the email address");
        }
        store::monitors::add_monitors(&pool, email, &domains).await?;
        return Ok(());
    }

    if let Some(arg) = &cli.remove {
        let parts: Vec<&str> = arg.split_whitespace().collect();
        let [email, domain] = parts.as_slice() else {
            bail!("--remove expects \"email domain\"");
        };
        store::monitors::remove_monitor(&pool, email, domain).await?;
        return Ok(());
    }

    if cli.norun {
        info!("scan skipped (--norun)");
        return Ok(());
    }

    let client = CtClient::new(config.sync.http_timeout_secs)?;

    let notifier: Option<Arc<dyn Notifier>> = if config.notify.enabled {
        Some(match config.notify.transport {
            NotifyTransport::Smtp => Arc::new(SmtpNotifier::from_config(&config.notify)?),
            NotifyTransport::Sendmail => {
                Arc::new(SendmailNotifier::new(&config.notify.from_address)?)
            }
        })
    } else {
        None
    };

    let dump_path = cli
        .dump
        .then(|| cli.dump_path.clone().unwrap_or_else(|| config.dump_path.clone()));

    let pipeline = SyncPipeline::new(pool, client, config.sync, notifier, dump_path);
    let stats = pipeline.run().await.context("sync run failed")?;

    info!(
        staged = stats.certs_staged,
        groups = stats.groups_notified,
        "certwatch finished"
    );
    Ok(())
}
