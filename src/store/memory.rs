//! In-memory artifact store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ArtifactStore, ContentFingerprint, StoreError};

/// In-memory store, used by tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemoryArtifactStore {
    artifacts: Arc<Mutex<HashMap<ContentFingerprint, Arc<Vec<u8>>>>>,
    writes: Arc<AtomicUsize>,
    fail_puts: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every `put` fails
    pub fn failing() -> Self {
        Self {
            fail_puts: true,
            ..Self::default()
        }
    }

    /// Number of distinct artifacts held
    pub fn len(&self) -> usize {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `put` calls that wrote new bytes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentFingerprint, StoreError> {
        if self.fail_puts {
            return Err(StoreError::Other("store is read-only".to_string()));
        }
        let fingerprint = ContentFingerprint::of(bytes);
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        if !artifacts.contains_key(&fingerprint) {
            artifacts.insert(fingerprint.clone(), Arc::new(bytes.to_vec()));
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(fingerprint)
    }

    async fn exists(&self, fingerprint: &ContentFingerprint) -> Result<bool, StoreError> {
        Ok(self
            .artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(fingerprint))
    }

    async fn get(&self, fingerprint: &ContentFingerprint) -> Result<Vec<u8>, StoreError> {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(fingerprint)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| StoreError::NotFound(fingerprint.clone()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
