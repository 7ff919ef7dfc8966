//! Process-local blob storage.
//!
//! Keeps blobs in a concurrent map. Selected with `storage.backend: memory`
//! for local development, and used throughout the test suite so no Azure
//! account is needed.

use bytes::Bytes;
use dashmap::DashMap;

use super::{BlobEntry, BlobStorage, Result, StorageError};

pub struct InMemoryBlobStorage {
    container: String,
    blobs: DashMap<String, Bytes>,
}

impl InMemoryBlobStorage {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blobs: DashMap::new(),
        }
    }

    fn uri(&self, name: &str) -> String {
        format!("memory://{}/{}", self.container, name)
    }
}

#[async_trait::async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(name))
    }

    async fn upload(&self, name: &str, content: Bytes) -> Result<()> {
        self.blobs.insert(name.to_string(), content);
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Bytes> {
        self.blobs
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound { name: name.to_string() })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.blobs.remove(name);
        Ok(())
    }

    async fn list_blobs(&self) -> Result<Vec<BlobEntry>> {
        let mut entries: Vec<BlobEntry> = self
            .blobs
            .iter()
            .map(|entry| BlobEntry {
                name: entry.key().clone(),
                uri: self.uri(entry.key()),
            })
            .collect();
        // DashMap iteration order is arbitrary; keep enumeration stable.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let storage = InMemoryBlobStorage::new("images");

        assert!(!storage.exists("A.png").await.unwrap());
        storage.upload("A.png", Bytes::from_static(b"pixels")).await.unwrap();
        assert!(storage.exists("A.png").await.unwrap());
        assert_eq!(storage.download("A.png").await.unwrap(), Bytes::from_static(b"pixels"));

        storage.delete("A.png").await.unwrap();
        assert!(!storage.exists("A.png").await.unwrap());
    }

    #[tokio::test]
    async fn download_of_absent_blob_is_not_found() {
        let storage = InMemoryBlobStorage::new("images");
        assert!(matches!(
            storage.download("nope").await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn lists_blobs_sorted_with_uris() {
        let storage = InMemoryBlobStorage::new("images");
        storage.upload("B.jpg", Bytes::from_static(b"b")).await.unwrap();
        storage.upload("A.png", Bytes::from_static(b"a")).await.unwrap();

        let entries = storage.list_blobs().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "A.png");
        assert_eq!(entries[0].uri, "memory://images/A.png");
        assert_eq!(entries[1].name, "B.jpg");

        // delete is idempotent
        storage.delete("A.png").await.unwrap();
        storage.delete("A.png").await.unwrap();
        assert_eq!(storage.list_blobs().await.unwrap().len(), 1);
    }
}
