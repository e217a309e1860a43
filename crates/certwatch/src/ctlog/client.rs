//! HTTP client for CT log endpoints.
//!
//! One `CtClient` is built at startup and shared read-only by every
//! downloader. TLS verification is disabled on purpose: log operators run
//! heterogeneous, sometimes self-signed, endpoint certificates and the data
//! we fetch is integrity-protected by the log itself, not by the channel.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{CtError, Result};

/// Signed Tree Head, as served by `ct/v1/get-sth`. Only `tree_size` is
/// consumed by the pipeline; the remaining fields are kept for logging.
#[derive(Debug, Clone, Deserialize)]
pub struct Sth {
    pub tree_size: i64,
    pub timestamp: i64,
    #[serde(default)]
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

/// A single undecoded Merkle tree leaf from `ct/v1/get-entries`.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub leaf_input: Vec<u8>,
    pub extra_data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    leaf_input: String,
    #[serde(default)]
    extra_data: String,
}

#[derive(Debug, Deserialize)]
struct WireEntries {
    entries: Vec<WireEntry>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error_message: String,
    #[allow(dead_code)]
    #[serde(default)]
    success: bool,
}

/// Source of log entries, abstracted so the downloader can be driven by a
/// scripted source in tests.
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// Fetch leaves for the inclusive index range `[start, end]`. The log
    /// may return fewer entries than requested; callers must advance their
    /// cursor by the returned count.
    async fn entries(&self, log_url: &str, start: i64, end: i64) -> Result<Vec<LogEntry>>;
}

/// Shared HTTP client for all CT log traffic.
#[derive(Debug, Clone)]
pub struct CtClient {
    client: Client,
}

impl CtClient {
    /// Build the process-wide client.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("certwatch/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch the current Signed Tree Head of a log.
    pub async fn get_sth(&self, log_url: &str) -> Result<Sth> {
        let url = format!("{}ct/v1/get-sth", log_url);
        let body = self.get_text(&url).await?;
        decode_json::<Sth>(&body)
    }

    /// Fetch entries for `[start, end]`, decoding the base64 payloads.
    pub async fn get_entries(&self, log_url: &str, start: i64, end: i64) -> Result<Vec<LogEntry>> {
        let url = format!("{}ct/v1/get-entries?start={}&end={}", log_url, start, end);
        let body = self.get_text(&url).await?;

        // Error envelopes come back with HTTP 200 from some operators, so
        // classification is body-driven rather than status-driven.
        if body.contains("\"error_message\"") {
            let envelope = decode_json::<WireError>(&body)?;
            return Err(CtError::Rejected(envelope.error_message));
        }

        let wire = decode_json::<WireEntries>(&body)?;
        let mut out = Vec::with_capacity(wire.entries.len());
        for entry in wire.entries {
            out.push(LogEntry {
                leaf_input: BASE64.decode(entry.leaf_input.as_bytes())?,
                extra_data: BASE64.decode(entry.extra_data.as_bytes())?,
            });
        }
        Ok(out)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl EntrySource for CtClient {
    async fn entries(&self, log_url: &str, start: i64, end: i64) -> Result<Vec<LogEntry>> {
        self.get_entries(log_url, start, end).await
    }
}

/// Decode a JSON body, mapping non-JSON content (throttle pages are served
/// as HTML) to the transient [`CtError::Opaque`] kind.
fn decode_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(err) => {
            let trimmed = body.trim_start();
            if trimmed.starts_with('<') || trimmed.is_empty() {
                Err(CtError::Opaque(body.len()))
            } else {
                Err(CtError::Json(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        assert!(CtClient::new(30).is_ok());
    }

    #[test]
    fn decode_sth_json() {
        let body = r#"{
            "tree_size": 123456,
            "timestamp": 1711290954479,
            "sha256_root_hash": "n6mTRHyLtLpkdHZBYYjYJtUGPmo5r6CFn1F1Cq2E7zY=",
            "tree_head_signature": "BAMARjBEAiA="
        }"#;
        let sth = decode_json::<Sth>(body).unwrap();
        assert_eq!(sth.tree_size, 123456);
        assert_eq!(sth.timestamp, 1711290954479);
    }

    #[test]
    fn html_body_is_opaque() {
        let body = "<html><head><title>429 Too Many Requests</title></head></html>";
        match decode_json::<Sth>(body) {
            Err(CtError::Opaque(len)) => assert_eq!(len, body.len()),
            other => panic!("expected Opaque, got {:?}", other.err()),
        }
    }

    #[test]
    fn truncated_json_is_a_json_error() {
        let body = r#"{"tree_size": 12"#;
        assert!(matches!(decode_json::<Sth>(body), Err(CtError::Json(_))));
    }
}
