//! Store backend trait definition
//!
//! Defines the async interface every model store must implement. The store
//! doubles as the coordination medium between workers: the chief watches a
//! directory's entries to learn when worker temp trees have been cleaned up.

use async_trait::async_trait;
use bytes::Bytes;
use cluster_core::Result;

/// Async trait for model store backends
///
/// Implementors provide binary reads and writes plus the two directory
/// primitives the save barrier is built on: shallow entry listing and
/// recursive tree removal. Both local filesystem and object stores
/// implement this.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Read the contents at the given path
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if nothing exists at the path.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write data at the given path, creating parent directories.
    ///
    /// Writes are atomic where the backend allows it (unique temp name,
    /// then rename), so a reader never observes a partial file.
    ///
    /// # Returns
    /// Number of bytes written
    async fn write(&self, path: &str, data: Bytes) -> Result<u64>;

    /// Check whether a path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Names of the immediate children of a directory.
    ///
    /// Never recurses: nested content must not surface in the listing,
    /// only the child entry that contains it. A missing directory lists
    /// as empty.
    async fn list_entries(&self, dir: &str) -> Result<Vec<String>>;

    /// Recursively delete the entry at the given path.
    ///
    /// Removes a directory with everything beneath it, or a single file.
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if nothing exists at the path.
    async fn remove_tree(&self, path: &str) -> Result<()>;
}
