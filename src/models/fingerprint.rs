//! Content fingerprints used as deduplication keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 of an artifact's raw bytes, lowercase hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentFingerprint(String);

/// Rejected fingerprint text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content fingerprint {0:?}: expected 64 hex characters")]
pub struct InvalidFingerprint(pub String);

impl ContentFingerprint {
    /// Fingerprint raw bytes
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parse a hex fingerprint, e.g. from a manifest or a file name
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl TryFrom<String> for ContentFingerprint {
    type Error = InvalidFingerprint;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        Self::parse(&hex).ok_or(InvalidFingerprint(hex))
    }
}

impl From<ContentFingerprint> for String {
    fn from(fingerprint: ContentFingerprint) -> Self {
        fingerprint.0
    }
}

impl std::fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
