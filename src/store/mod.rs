//! Content-addressed artifact storage and the shared fingerprint index.
//!
//! Artifacts are keyed by the SHA-256 of their bytes, so identical content is
//! written once no matter how many publications point at it. The
//! [`FingerprintIndex`] is the only piece of shared mutable state between
//! download workers; see its docs for the claim protocol.

mod fs;
mod index;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::models::ContentFingerprint;
pub use fs::FsArtifactStore;
pub use index::{Claim, ClaimGuard, FingerprintIndex, IndexManifest};
pub use memory::MemoryArtifactStore;

/// Errors raised by an artifact store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Artifact not found: {0}")]
    NotFound(ContentFingerprint),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Other(String),
}

/// Content-addressed storage interface
///
/// Implementations must be crash-safe: a `put` either stores the complete
/// artifact or leaves nothing behind.
#[async_trait]
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Store bytes and return their fingerprint; storing existing content is a no-op
    async fn put(&self, bytes: &[u8]) -> Result<ContentFingerprint, StoreError>;

    /// Whether an artifact with this fingerprint is stored
    async fn exists(&self, fingerprint: &ContentFingerprint) -> Result<bool, StoreError>;

    /// Read an artifact's bytes
    async fn get(&self, fingerprint: &ContentFingerprint) -> Result<Vec<u8>, StoreError>;

    /// Human-readable location, for logs and CLI output
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}
