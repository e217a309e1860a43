//! Monitor management for the admin CLI.

use regex::Regex;
use sqlx::PgPool;
use tracing::info;

use super::{Result, StoreError};

const EMAIL_PATTERN: &str =
    r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

const DOMAIN_PATTERN: &str = r"^(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9_-]{0,61}[a-zA-Z0-9])\.(?:[a-zA-Z]{2,6}|[a-zA-Z0-9-]{2,30}\.[a-zA-Z]{2,3})$";

fn validate_email(email: &str) -> Result<()> {
    if !Regex::new(EMAIL_PATTERN)?.is_match(email) {
        return Err(StoreError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    if !Regex::new(DOMAIN_PATTERN)?.is_match(domain) {
        return Err(StoreError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

/// Subscribe an email address to one or more domains. Validation happens
/// up front so a bad domain in the middle of the list does not leave a
/// partial subscription behind.
pub async fn add_monitors(pool: &PgPool, email: &str, domains: &[String]) -> Result<()> {
    validate_email(email)?;
    for domain in domains {
        validate_domain(domain)?;
    }

    for domain in domains {
        sqlx::query("INSERT INTO monitor (email, domain) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(email)
            .bind(domain)
            .execute(pool)
            .await?;
    }

    info!(email = %email, domains = domains.len(), "monitors added");
    Ok(())
}

/// Remove one (email, domain) subscription.
pub async fn remove_monitor(pool: &PgPool, email: &str, domain: &str) -> Result<()> {
    validate_email(email)?;
    validate_domain(domain)?;

    let result = sqlx::query("DELETE FROM monitor WHERE email = $1 AND domain = $2")
        .bind(email)
        .bind(domain)
        .execute(pool)
        .await?;

    info!(
        email = %email,
        domain = %domain,
        removed = result.rows_affected(),
        "monitor removed"
    );
    Ok(())
}
