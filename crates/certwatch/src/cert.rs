//! Certificate identity extraction and the Common Name sanity filter.
//!
//! A decoded leaf becomes a [`CertInfo`] record: the identity fields we
//! persist and match against monitored domains. Pre-certificates carry only
//! a TBSCertificate, so extraction works on the TBS level for both kinds.

use chrono::DateTime;
use x509_parser::prelude::*;

use crate::ctlog::LeafPayload;

/// Result type for certificate extraction.
pub type Result<T> = std::result::Result<T, CertError>;

/// Error types for X.509 extraction.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("x509 parse failed: {0}")]
    Parse(String),

    #[error("certificate validity time out of range")]
    Time,
}

/// Identity fields of one logged certificate.
///
/// `san` is the comma-terminated DNS name list (`"a.example,b.example,"`,
/// empty string when the certificate carries no DNS names). The trailing
/// comma is load-bearing: the SQL match predicate in the store layer keys
/// on it, and the two sides must agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub cn: String,
    pub dn: String,
    pub serial: String,
    pub san: String,
    pub not_before: String,
    pub not_after: String,
    pub issuer: String,
}

impl CertInfo {
    /// Extract identity fields from a leaf payload.
    pub fn from_payload(payload: &LeafPayload) -> Result<Self> {
        match payload {
            LeafPayload::X509(der) => {
                let (_, cert) = parse_x509_certificate(der)
                    .map_err(|e| CertError::Parse(e.to_string()))?;
                extract(&cert.tbs_certificate)
            }
            LeafPayload::Precert(der) => {
                let (_, tbs) = TbsCertificate::from_der(der)
                    .map_err(|e| CertError::Parse(e.to_string()))?;
                extract(&tbs)
            }
        }
    }

    /// SAN entries as a list, with the sentinel stripped.
    pub fn san_names(&self) -> Vec<String> {
        self.san
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn extract(tbs: &TbsCertificate<'_>) -> Result<CertInfo> {
    let cn = tbs
        .subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default()
        .to_string();

    Ok(CertInfo {
        cn,
        dn: tbs.subject.to_string(),
        serial: tbs.raw_serial_as_string().replace(':', ""),
        san: join_san(&dns_names(tbs)),
        not_before: format_time(&tbs.validity.not_before)?,
        not_after: format_time(&tbs.validity.not_after)?,
        issuer: tbs.issuer.to_string(),
    })
}

fn dns_names(tbs: &TbsCertificate<'_>) -> Vec<String> {
    for ext in tbs.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            return san
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect();
        }
    }
    Vec::new()
}

/// Comma-join DNS names with a trailing sentinel comma when non-empty.
pub fn join_san(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        let mut out = names.join(",");
        out.push(',');
        out
    }
}

fn format_time(time: &ASN1Time) -> Result<String> {
    let dt = DateTime::from_timestamp(time.timestamp(), 0).ok_or(CertError::Time)?;
    Ok(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Sanity filter on the Subject Common Name.
///
/// CNs that look like a registrable host name (public suffix plus one) must
/// actually be one: no whitespace, no ':' outside IPv6 literals, not blank.
/// Everything else (IP literals, internal names, empty CNs in SAN-only
/// certificates) passes through untouched; the match predicate decides
/// relevance later.
pub fn plausible_cn(cn: &str) -> bool {
    if psl::domain_str(cn).is_none() {
        return true;
    }
    if cn.parse::<std::net::Ipv4Addr>().is_ok() || cn.parse::<std::net::Ipv6Addr>().is_ok() {
        return true;
    }
    !(cn.chars().any(char::is_whitespace) || cn.contains(':') || cn.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_san_terminates_with_comma() {
        assert_eq!(join_san(&[]), "");
        assert_eq!(join_san(&["example.com".into()]), "example.com,");
        assert_eq!(
            join_san(&["a.example.com".into(), "b.example.com".into()]),
            "a.example.com,b.example.com,"
        );
    }

    #[test]
    fn san_names_round_trip() {
        let info = CertInfo {
            cn: "example.com".into(),
            dn: "CN=example.com".into(),
            serial: "1f".into(),
            san: "example.com,www.example.com,".into(),
            not_before: "2026-01-01 00:00:00".into(),
            not_after: "2026-04-01 00:00:00".into(),
            issuer: "CN=Test CA".into(),
        };
        assert_eq!(info.san_names(), vec!["example.com", "www.example.com"]);

        let empty = CertInfo { san: String::new(), ..info };
        assert!(empty.san_names().is_empty());
    }

    #[test]
    fn filter_accepts_ordinary_hostnames() {
        assert!(plausible_cn("example.com"));
        assert!(plausible_cn("www.example.co.uk"));
        assert!(plausible_cn("deep.sub.domain.example.org"));
    }

    #[test]
    fn filter_accepts_ip_literals() {
        assert!(plausible_cn("192.168.12.1"));
        assert!(plausible_cn("2001:db8::1"));
    }

    #[test]
    fn filter_accepts_non_hostname_subjects() {
        // No registrable domain, so the hostname rules do not apply.
        assert!(plausible_cn("Some Corporate CA"));
        assert!(plausible_cn("localhost"));
        assert!(plausible_cn(""));
    }

    #[test]
    fn filter_rejects_malformed_hostnames() {
        assert!(!plausible_cn("exa mple.com"));
        assert!(!plausible_cn("example.com:8443"));
        assert!(!plausible_cn("\texample.org"));
    }
}
