//! JSONL dump of the staging table for API consumption.
//!
//! One object per line, written to a temp file in the target directory and
//! atomically renamed over the previous dump, so readers never observe a
//! half-written file.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::store::staging::StagedIdentity;

/// Result type for dump operations.
pub type Result<T> = std::result::Result<T, DumpError>;

/// Error types for dump writing.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct DumpRecord<'a> {
    #[serde(rename = "CN")]
    cn: &'a str,
    #[serde(rename = "SAN")]
    san: Vec<&'a str>,
    #[serde(rename = "NotBefore")]
    not_before: &'a str,
    #[serde(rename = "NotAfter")]
    not_after: &'a str,
}

/// Write all staged identities to `path`, replacing any previous dump.
/// Returns the number of lines written.
pub fn write_dump(path: &Path, rows: &[StagedIdentity]) -> Result<usize> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let record = DumpRecord {
            cn: &row.cn,
            san: row.san.split(',').filter(|s| !s.is_empty()).collect(),
            not_before: &row.not_before,
            not_after: &row.not_after,
        };
        serde_json::to_writer(&mut tmp, &record)?;
        tmp.write_all(b"\n")?;
    }

    tmp.persist(path).map_err(|e| DumpError::Io(e.error))?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cn: &str, san: &str) -> StagedIdentity {
        StagedIdentity {
            cn: cn.to_string(),
            san: san.to_string(),
            not_before: "2026-01-01 00:00:00".to_string(),
            not_after: "2026-04-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");

        let written = write_dump(
            &path,
            &[
                row("example.com", "example.com,www.example.com,"),
                row("other.org", ""),
            ],
        )
        .unwrap();
        assert_eq!(written, 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["CN"], "example.com");
        assert_eq!(
            first["SAN"],
            serde_json::json!(["example.com", "www.example.com"])
        );
        assert_eq!(first["NotBefore"], "2026-01-01 00:00:00");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["SAN"], serde_json::json!([]));
    }

    #[test]
    fn replaces_the_previous_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");

        write_dump(&path, &[row("a.example", "a.example,")]).unwrap();
        write_dump(&path, &[row("b.example", "b.example,")]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("b.example"));
        assert!(!content.contains("a.example"));
    }

    #[test]
    fn empty_staging_produces_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.jsonl");

        assert_eq!(write_dump(&path, &[]).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
