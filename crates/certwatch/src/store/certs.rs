//! Matching staged certificates against monitors and archiving the hits.
//!
//! The match predicate and the parser's SAN encoding form one contract: the
//! SAN column is a comma-terminated list (`"a.example,b.example,"`), so a
//! first-entry match is `san LIKE domain || ',%'` and a subdomain match
//! anywhere in the list is `position('.' || domain IN san) > 0`.

use chrono::Utc;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::info;

use super::Result;
use crate::cert::CertInfo;

/// The five-way domain match, shared by the archive insert and the
/// notification re-join. `d` is the certificate row, `m` the monitor row.
const MATCH_CLAUSE: &str = "\
    {d}.cn = {m}.domain \
    OR {d}.cn = 'www.' || {m}.domain \
    OR {d}.cn LIKE '%.' || {m}.domain \
    OR {d}.san LIKE {m}.domain || ',%' \
    OR position('.' || {m}.domain IN {d}.san) > 0";

fn match_clause(cert_alias: &str, monitor_alias: &str) -> String {
    MATCH_CLAUSE
        .replace("{d}", cert_alias)
        .replace("{m}", monitor_alias)
}

/// Certificates newly archived for one monitoring address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchGroup {
    pub email: String,
    pub certs: Vec<CertInfo>,
}

#[derive(Debug, sqlx::FromRow)]
struct MatchedRow {
    email: String,
    cn: String,
    dn: String,
    serial_number: String,
    san: String,
    not_before: String,
    not_after: String,
    issuer: String,
}

/// Append the distinct matched staging rows to the permanent table and
/// return them grouped per monitoring email.
///
/// Runs as a single statement in one transaction: the CTE inserts with
/// `ON CONFLICT DO NOTHING`, so only rows the permanent table has never
/// seen come back, and only those are notified.
pub async fn archive_matches(pool: &PgPool) -> Result<Vec<MatchGroup>> {
    let query = format!(
        "WITH fresh AS ( \
             INSERT INTO certificate (cn, dn, serial_number, san, not_before, not_after, issuer) \
             SELECT DISTINCT d.cn, d.dn, d.serial_number, d.san, d.not_before, d.not_after, d.issuer \
             FROM downloaded d JOIN monitor m ON {} \
             ON CONFLICT DO NOTHING \
             RETURNING cn, dn, serial_number, san, not_before, not_after, issuer \
         ) \
         SELECT m.email, f.cn, f.dn, f.serial_number, f.san, f.not_before, f.not_after, f.issuer \
         FROM fresh f JOIN monitor m ON {} \
         ORDER BY m.email, f.cn",
        match_clause("d", "m"),
        match_clause("f", "m"),
    );

    let mut tx = pool.begin().await?;
    let rows = sqlx::query_as::<_, MatchedRow>(&query)
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;

    let mut grouped: BTreeMap<String, Vec<CertInfo>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.email).or_default().push(CertInfo {
            cn: row.cn,
            dn: row.dn,
            serial: row.serial_number,
            san: row.san,
            not_before: row.not_before,
            not_after: row.not_after,
            issuer: row.issuer,
        });
    }

    let groups: Vec<MatchGroup> = grouped
        .into_iter()
        .map(|(email, certs)| MatchGroup { email, certs })
        .collect();

    info!(
        groups = groups.len(),
        certificates = groups.iter().map(|g| g.certs.len()).sum::<usize>(),
        "matched staged certificates against monitors"
    );

    Ok(groups)
}

/// Drop permanent rows whose validity window has closed. Timestamps are
/// stored as `YYYY-MM-DD HH:MM:SS` strings, which compare correctly in
/// lexicographic order.
pub async fn delete_expired(pool: &PgPool) -> Result<u64> {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let result = sqlx::query("DELETE FROM certificate WHERE not_after < $1")
        .bind(&now)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        info!(removed = result.rows_affected(), "expired certificates pruned");
    }
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rust mirror of MATCH_CLAUSE, used to pin down the predicate semantics
    /// without a database. The SQL-vs-mirror agreement is covered by the
    /// database integration tests.
    fn matches_domain(cn: &str, san: &str, domain: &str) -> bool {
        cn == domain
            || cn == format!("www.{}", domain)
            || cn.ends_with(&format!(".{}", domain))
            || san.starts_with(&format!("{},", domain))
            || san.contains(&format!(".{}", domain))
    }

    #[test]
    fn clause_aliases_are_substituted() {
        let clause = match_clause("d", "m");
        assert!(clause.contains("d.cn = m.domain"));
        assert!(clause.contains("d.san LIKE m.domain || ',%'"));
        assert!(!clause.contains("{d}"));
        assert!(!clause.contains("{m}"));
    }

    #[test]
    fn predicate_matches_monitored_names() {
        assert!(matches_domain("example.com", "", "example.com"));
        assert!(matches_domain("www.example.com", "", "example.com"));
        assert!(matches_domain("foo.example.com", "", "example.com"));
        // SAN first entry
        assert!(matches_domain("other.org", "example.com,other.org,", "example.com"));
        // subdomain anywhere in the SAN list
        assert!(matches_domain("other.org", "a.org,shop.example.com,", "example.com"));
    }

    #[test]
    fn predicate_rejects_lookalikes() {
        assert!(!matches_domain("notexample.com", "", "example.com"));
        assert!(!matches_domain("other.org", "badexample.com,", "example.com"));
        // mid-list exact entry is not a first-entry match
        assert!(!matches_domain("other.org", "a.org,example.com,", "example.com"));
    }
}
