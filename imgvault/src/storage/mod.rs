//! Blob storage backends.
//!
//! Everything the HTTP layer knows about storage goes through the
//! [`BlobStorage`] trait: existence checks, whole-blob reads and writes,
//! deletion, and container enumeration. Two backends implement it:
//!
//! - [`azure::AzureBlobStorage`]: talks to an Azure Blob Storage container
//!   over the Blob REST API with Shared Key authentication
//! - [`memory::InMemoryBlobStorage`]: process-local map, used for local
//!   development and tests

pub mod azure;
pub mod memory;

pub use azure::AzureBlobStorage;
pub use memory::InMemoryBlobStorage;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error as ThisError;

/// Errors surfaced by a storage backend.
#[derive(ThisError, Debug)]
pub enum StorageError {
    /// The named blob does not exist in the container
    #[error("blob {name} not found")]
    NotFound { name: String },

    /// Any other backend failure, carrying the backend's own message
    #[error("{message}")]
    Backend { message: String },
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A blob as seen by container enumeration: its name and access URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub name: String,
    pub uri: String,
}

/// Contract for the blob-storage collaborator.
///
/// Whole-blob semantics: `upload` and `download` move complete byte
/// buffers. Callers own naming; backends never invent or rewrite names.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Check whether a blob with this name exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Write the full contents of a blob, overwriting any previous blob
    /// with the same name.
    async fn upload(&self, name: &str, content: Bytes) -> Result<()>;

    /// Read the full contents of a blob.
    ///
    /// Returns [`StorageError::NotFound`] if no such blob exists.
    async fn download(&self, name: &str) -> Result<Bytes>;

    /// Delete a blob. Deleting an absent blob is not an error.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Enumerate all blobs in the container.
    async fn list_blobs(&self) -> Result<Vec<BlobEntry>>;
}
