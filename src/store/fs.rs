//! Content-addressed artifact directory.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{ArtifactStore, ContentFingerprint, StoreError};

/// Content-addressed directory store
///
/// Layout: `<root>/<first two hex chars>/<fingerprint>.pdf`. Writes go to a
/// temporary file in the target directory and are renamed into place, so a
/// crash never leaves a partial artifact under its final name.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of an artifact
    pub fn path_for(&self, fingerprint: &ContentFingerprint) -> PathBuf {
        self.root
            .join(&fingerprint.as_str()[..2])
            .join(format!("{}.pdf", fingerprint))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent"))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentFingerprint, StoreError> {
        let fingerprint = ContentFingerprint::of(bytes);
        let path = self.path_for(&fingerprint);
        if tokio::fs::try_exists(&path).await? {
            tracing::debug!("Artifact {} already on disk", fingerprint.short());
            return Ok(fingerprint);
        }

        let bytes = bytes.to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &bytes))
            .await
            .map_err(|e| StoreError::Other(format!("write task failed: {}", e)))??;

        tracing::debug!("Stored artifact {} at {}", fingerprint.short(), path.display());
        Ok(fingerprint)
    }

    async fn exists(&self, fingerprint: &ContentFingerprint) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.path_for(fingerprint)).await?)
    }

    async fn get(&self, fingerprint: &ContentFingerprint) -> Result<Vec<u8>, StoreError> {
        match tokio::fs::read(self.path_for(fingerprint)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(fingerprint.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
