//! Storage Abstractions
//!
//! Local file access for ledgers and checkpoints, and the remote object store
//! that receives archived variants.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn save(fs: &dyn FileSystemAccess, dir: &Path, data: &[u8]) -> Result<()> {
///     fs.create_dir_all(dir).await?;
///     fs.write_file(&dir.join("data.json"), Bytes::copy_from_slice(data)).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Atomically move `from` over `to`
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// An object already present in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    /// Store-specific content fingerprint, if the store reports one.
    pub fingerprint: Option<String>,
}

/// Remote object store receiving archived variants
///
/// Paths are `/`-separated folder paths relative to the store root; `name`
/// is the object file name inside that folder.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look up an object. Returns `Ok(None)` when nothing exists at the path.
    async fn get_item(&self, path: &str, name: &str) -> Result<Option<RemoteItem>>;

    /// Upload `data`, replacing any existing object.
    ///
    /// Implementations must split large payloads into resumable chunks.
    async fn upload_large(&self, path: &str, name: &str, data: Bytes) -> Result<()>;

    /// Create a public link for an item.
    async fn make_share_link(&self, item_id: &str) -> Result<String>;

    /// Compare a remote-reported fingerprint with one computed over `data`.
    fn fingerprint_matches(&self, remote: &str, data: &[u8]) -> bool;
}
