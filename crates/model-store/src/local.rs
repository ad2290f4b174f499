//! Local filesystem store backend
//!
//! Provides async file I/O with atomic writes to prevent partial/corrupt
//! files. Directory listing and recursive removal map straight onto the
//! filesystem, so a shared mount gives every worker the same view.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use cluster_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_stream::{wrappers::ReadDirStream, StreamExt};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::StoreBackend;

/// Local filesystem store backend
///
/// Stores data in a local directory with support for:
/// - Atomic writes (write to .tmp, then rename)
/// - Automatic directory creation
/// - Shallow entry listing and recursive tree removal
#[derive(Debug, Clone)]
pub struct LocalStore {
    /// Base path for all store operations
    base_path: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore instance
    ///
    /// # Arguments
    /// * `base_path` - Directory to use as the store root
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a store-relative path to an absolute path
    fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Generate a unique temporary file path
    fn temp_path(&self, path: &str) -> PathBuf {
        let full_path = self.resolve_path(path);
        let temp_name = format!(
            ".{}.{}.tmp",
            full_path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4()
        );
        full_path.with_file_name(temp_name)
    }
}

#[async_trait]
impl StoreBackend for LocalStore {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.resolve_path(path);
        debug!(?full_path, "Reading file");

        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to read {}: {}", path, e),
            }),
        }
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn write(&self, path: &str, data: Bytes) -> Result<u64> {
        let full_path = self.resolve_path(path);
        let temp_path = self.temp_path(path);
        let size = data.len() as u64;

        debug!(?full_path, ?temp_path, size, "Writing file atomically");

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage {
                    message: format!("Failed to create directory {:?}: {}", parent, e),
                })?;
        }

        // Write to temporary file
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create temp file {:?}: {}", temp_path, e),
            })?;

        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write data: {}", e),
        })?;

        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync file: {}", e),
        })?;

        // Atomic rename
        fs::rename(&temp_path, &full_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, full_path, e),
            })?;

        debug!(?full_path, size, "File written successfully");
        Ok(size)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.resolve_path(path);
        Ok(fs::metadata(&full_path).await.is_ok())
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list_entries(&self, dir: &str) -> Result<Vec<String>> {
        let full_path = self.resolve_path(dir);
        debug!(?full_path, "Listing directory entries");

        let read_dir = match fs::read_dir(&full_path).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to list {}: {}", dir, e),
                })
            }
        };

        let mut stream = ReadDirStream::new(read_dir);
        let mut names = Vec::new();

        while let Some(entry) = stream.next().await {
            let entry = entry.map_err(|e| Error::Storage {
                message: format!("Failed to read entry under {}: {}", dir, e),
            })?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }

        names.sort();
        debug!(count = names.len(), "Found entries");
        Ok(names)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn remove_tree(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        debug!(?full_path, "Removing tree");

        let metadata = match fs::metadata(&full_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::StoragePathNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to stat {}: {}", path, e),
                })
            }
        };

        let removal = if metadata.is_dir() {
            fs::remove_dir_all(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };

        removal.map_err(|e| Error::Storage {
            message: format!("Failed to remove {}: {}", path, e),
        })
    }
}
