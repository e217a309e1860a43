//! TLS-struct decoding of RFC 6962 `MerkleTreeLeaf`.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! Version        version;          // 1 byte, v1 = 0
//! MerkleLeafType leaf_type;        // 1 byte, timestamped_entry = 0
//! uint64         timestamp;
//! LogEntryType   entry_type;       // 2 bytes, x509 = 0, precert = 1
//! x509:    opaque ASN.1Cert<1..2^24-1>;
//! precert: opaque issuer_key_hash[32];
//!          opaque TBSCertificate<1..2^24-1>;
//! CtExtensions   extensions<0..2^16-1>;
//! ```
//!
//! Trailing bytes after the extensions are treated as corruption and
//! rejected, matching the strictness of the log clients this replaces.

use super::{CtError, Result};

const VERSION_V1: u8 = 0;
const LEAF_TYPE_TIMESTAMPED_ENTRY: u8 = 0;
const ENTRY_TYPE_X509: u16 = 0;
const ENTRY_TYPE_PRECERT: u16 = 1;

/// Certificate payload carried by a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafPayload {
    /// Full DER-encoded certificate.
    X509(Vec<u8>),
    /// DER-encoded TBSCertificate of a pre-certificate. The issuer key hash
    /// is decoded past but not retained; nothing downstream consumes it.
    Precert(Vec<u8>),
}

/// Decoded `MerkleTreeLeaf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTreeLeaf {
    pub timestamp: u64,
    pub payload: LeafPayload,
}

impl MerkleTreeLeaf {
    /// Decode a leaf from the raw `leaf_input` bytes.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let mut r = Reader::new(input);

        let version = r.u8()?;
        if version != VERSION_V1 {
            return Err(CtError::Leaf(format!("unsupported leaf version {}", version)));
        }

        let leaf_type = r.u8()?;
        if leaf_type != LEAF_TYPE_TIMESTAMPED_ENTRY {
            return Err(CtError::Leaf(format!("unsupported leaf type {}", leaf_type)));
        }

        let timestamp = r.u64()?;
        let entry_type = r.u16()?;

        let payload = match entry_type {
            ENTRY_TYPE_X509 => {
                let len = r.u24()?;
                LeafPayload::X509(r.take(len as usize)?.to_vec())
            }
            ENTRY_TYPE_PRECERT => {
                r.take(32)?; // issuer_key_hash
                let len = r.u24()?;
                LeafPayload::Precert(r.take(len as usize)?.to_vec())
            }
            other => return Err(CtError::Leaf(format!("unknown entry type {}", other))),
        };

        let ext_len = r.u16()?;
        r.take(ext_len as usize)?;

        if !r.is_empty() {
            return Err(CtError::Leaf(format!(
                "{} trailing bytes after extensions",
                r.remaining()
            )));
        }

        Ok(Self { timestamp, payload })
    }
}

/// Minimal big-endian byte reader over a borrowed slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CtError::Leaf(format!(
                "truncated leaf: wanted {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
