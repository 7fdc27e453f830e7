//! Shared fingerprint index with atomic per-fingerprint claims.
//!
//! Claiming is a single check-and-reserve under one lock. The winner receives
//! a [`ClaimGuard`] and stores the artifact; concurrent losers wait on a watch
//! channel until the winner commits (they then see the stored artifact) or
//! abandons (they retry the claim themselves).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use super::{ContentFingerprint, StoreError};
use crate::models::ArtifactRef;

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimState {
    Pending,
    Committed,
    Abandoned,
}

#[derive(Debug)]
enum Slot {
    InProgress(watch::Receiver<ClaimState>),
    Stored(ArtifactRef),
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<ContentFingerprint, Slot>,
    publications: HashMap<String, ContentFingerprint>,
}

/// Result of [`FingerprintIndex::claim`]
#[derive(Debug)]
pub enum Claim {
    /// Caller owns the fingerprint and must store the artifact
    Owner(ClaimGuard),
    /// Content is already stored
    Stored(ArtifactRef),
}

/// Exclusive reservation of a fingerprint
///
/// Dropping the guard without [`ClaimGuard::commit`] abandons the claim and
/// wakes any waiters so one of them can take over.
#[derive(Debug)]
pub struct ClaimGuard {
    index: Arc<FingerprintIndex>,
    fingerprint: ContentFingerprint,
    sender: Option<watch::Sender<ClaimState>>,
}

impl ClaimGuard {
    pub fn fingerprint(&self) -> &ContentFingerprint {
        &self.fingerprint
    }

    /// Record the stored artifact and release waiters
    pub fn commit(mut self, artifact: ArtifactRef) {
        self.index
            .lock()
            .slots
            .insert(self.fingerprint.clone(), Slot::Stored(artifact));
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(ClaimState::Committed);
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        {
            let mut inner = self.index.lock();
            if matches!(inner.slots.get(&self.fingerprint), Some(Slot::InProgress(_))) {
                inner.slots.remove(&self.fingerprint);
            }
        }
        tracing::debug!("Claim on {} abandoned", self.fingerprint.short());
        let _ = sender.send(ClaimState::Abandoned);
    }
}

/// On-disk form of the index
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub artifacts: BTreeMap<ContentFingerprint, ArtifactRef>,
    pub publications: BTreeMap<String, ContentFingerprint>,
}

/// Fingerprint index shared by every download worker of a pipeline
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    inner: Mutex<Inner>,
}

impl FingerprintIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically claim `fingerprint`, or wait for whoever holds it
    pub async fn claim(self: &Arc<Self>, fingerprint: &ContentFingerprint) -> Claim {
        loop {
            let mut receiver = {
                let mut inner = self.lock();
                match inner.slots.get(fingerprint) {
                    Some(Slot::Stored(artifact)) => return Claim::Stored(artifact.clone()),
                    Some(Slot::InProgress(receiver)) => receiver.clone(),
                    None => {
                        let (sender, receiver) = watch::channel(ClaimState::Pending);
                        inner
                            .slots
                            .insert(fingerprint.clone(), Slot::InProgress(receiver));
                        return Claim::Owner(ClaimGuard {
                            index: Arc::clone(self),
                            fingerprint: fingerprint.clone(),
                            sender: Some(sender),
                        });
                    }
                }
            };

            tracing::debug!("Waiting for in-flight claim on {}", fingerprint.short());
            // Err means the owner vanished; either way re-examine the slot.
            let _ = receiver.wait_for(|state| *state != ClaimState::Pending).await;
        }
    }

    /// Stored artifact for a fingerprint, if committed
    pub fn artifact(&self, fingerprint: &ContentFingerprint) -> Option<ArtifactRef> {
        match self.lock().slots.get(fingerprint) {
            Some(Slot::Stored(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    /// Remember which artifact a publication resolved to
    pub fn remember(&self, publication_id: &str, fingerprint: &ContentFingerprint) {
        self.lock()
            .publications
            .insert(publication_id.to_string(), fingerprint.clone());
    }

    /// Artifact previously resolved for a publication
    pub fn artifact_for_publication(&self, publication_id: &str) -> Option<ArtifactRef> {
        let inner = self.lock();
        let fingerprint = inner.publications.get(publication_id)?;
        match inner.slots.get(fingerprint) {
            Some(Slot::Stored(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    /// Number of committed artifacts
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Stored(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of committed state
    pub fn manifest(&self) -> IndexManifest {
        let inner = self.lock();
        let artifacts = inner
            .slots
            .iter()
            .filter_map(|(fp, slot)| match slot {
                Slot::Stored(artifact) => Some((fp.clone(), artifact.clone())),
                Slot::InProgress(_) => None,
            })
            .collect::<BTreeMap<_, _>>();
        let publications = inner
            .publications
            .iter()
            .filter(|(_, fp)| artifacts.contains_key(*fp))
            .map(|(id, fp)| (id.clone(), fp.clone()))
            .collect();
        IndexManifest {
            version: MANIFEST_VERSION,
            artifacts,
            publications,
        }
    }

    /// Rebuild an index from a manifest
    pub fn from_manifest(manifest: IndexManifest) -> Arc<Self> {
        let index = Self::default();
        {
            let mut inner = index.lock();
            for (fp, artifact) in manifest.artifacts {
                inner.slots.insert(fp, Slot::Stored(artifact));
            }
            inner.publications.extend(manifest.publications);
        }
        Arc::new(index)
    }

    /// Write the manifest atomically as JSON
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(&self.manifest())?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Load a manifest; a missing file yields an empty index
    pub fn load(path: &Path) -> Result<Arc<Self>, StoreError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let manifest: IndexManifest = serde_json::from_slice(&bytes)?;
                if manifest.version != MANIFEST_VERSION {
                    return Err(StoreError::Other(format!(
                        "unsupported manifest version {}",
                        manifest.version
                    )));
                }
                Ok(Self::from_manifest(manifest))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }
}
