// Certificate Transparency log wire protocol (RFC 6962 client side).
//
// The sync pipeline talks to logs through two endpoints only:
// - get-sth: current tree head, consulted for tree_size
// - get-entries: raw Merkle tree leaves for an index range
//
// Everything here is transport and decoding; no signature or inclusion
// proof verification is performed.

pub mod client;
pub mod leaf;

pub use client::{CtClient, EntrySource, LogEntry, Sth};
pub use leaf::{LeafPayload, MerkleTreeLeaf};

/// Result type for CT wire operations.
pub type Result<T> = std::result::Result<T, CtError>;

/// Error types for the CT log boundary.
#[derive(Debug, thiserror::Error)]
pub enum CtError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("log rejected request: {0}")]
    Rejected(String),

    #[error("opaque non-json response ({0} bytes), likely a throttle page")]
    Opaque(usize),

    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("leaf decode failed: {0}")]
    Leaf(String),
}

impl CtError {
    /// Transient upstream noise that is not worth a warn-level log line.
    /// Throttle pages and the well-known rate limit envelopes show up
    /// thousands of times per run on busy logs.
    pub fn is_quiet(&self) -> bool {
        match self {
            CtError::Opaque(_) => true,
            CtError::Rejected(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("rate") || msg.contains("too many") || msg.contains("try again")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_errors_are_quiet() {
        assert!(CtError::Opaque(512).is_quiet());
        assert!(CtError::Rejected("Rate limit exceeded".into()).is_quiet());
        assert!(CtError::Rejected("too many requests".into()).is_quiet());
        assert!(!CtError::Rejected("unknown tree".into()).is_quiet());
        assert!(!CtError::Leaf("truncated".into()).is_quiet());
    }
}
