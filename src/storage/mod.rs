//! Outgoing archive: one copy of every relayed source file
//! Uses Apache Arrow object_store crate

use object_store::{ObjectStore, WriteMultipart, local::LocalFileSystem, path::Path as StoragePath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const CHUNK_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid archive key: {0}")]
    InvalidKey(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Metadata returned after archiving
#[derive(Debug, Clone)]
pub struct ArchivedCopy {
    pub key: String,
    pub size: u64,
}

/// Archive store wrapping object_store
///
/// Copies are keyed by file name; a later job for the same name replaces the
/// previous copy, matching the drop-in-place behavior of an outgoing folder.
#[derive(Clone)]
pub struct OutgoingArchive {
    store: Arc<dyn ObjectStore>,
}

impl OutgoingArchive {
    /// Create archive with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Archive into a local directory, created if missing
    pub fn local(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|source| ArchiveError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let store = LocalFileSystem::new_with_prefix(dir)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Create in-memory archive for testing
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Stream a local file into the archive under `file_name`
    pub async fn archive(&self, source: &Path, file_name: &str) -> Result<ArchivedCopy> {
        let key = StoragePath::parse(file_name).map_err(|_| ArchiveError::InvalidKey(file_name.to_string()))?;
        let mut file = tokio::fs::File::open(source).await.map_err(|e| ArchiveError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;

        let upload = self.store.put_multipart(&key).await?;
        let mut writer = WriteMultipart::new(upload);
        let mut buf = vec![0u8; CHUNK_BYTES];
        let mut size = 0u64;

        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    writer.abort().await?;
                    return Err(ArchiveError::Read {
                        path: source.to_path_buf(),
                        source: e,
                    });
                }
            };
            if n == 0 {
                break;
            }
            writer.wait_for_capacity(4).await?;
            writer.write(&buf[..n]);
            size += n as u64;
        }
        writer.finish().await?;

        tracing::info!(key = %key, size, "Archived outgoing copy");

        Ok(ArchivedCopy {
            key: key.to_string(),
            size,
        })
    }
}

#[cfg(test)]
impl OutgoingArchive {
    /// Check if a copy exists
    pub async fn exists(&self, file_name: &str) -> Result<bool> {
        let key = StoragePath::parse(file_name).map_err(|_| ArchiveError::InvalidKey(file_name.to_string()))?;

        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a copy back
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let key = StoragePath::parse(file_name).map_err(|_| ArchiveError::InvalidKey(file_name.to_string()))?;
        let bytes = self.store.get(&key).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
