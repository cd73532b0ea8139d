use async_trait::async_trait;
use bytes::Bytes;
use chainsweep_core::{Result, StorageKind};

/// Object storage holding backup artifacts. Paths are relative to the
/// backend's root (a local directory or a bucket).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    async fn read(&self, path: &str) -> Result<Bytes>;

    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    /// Deleting a path that does not exist succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Every object at or below `prefix`, recursively.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn stat(&self, path: &str) -> Result<ObjectInfo>;

    fn backend_type(&self) -> StorageKind;
}

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub path: String,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Utc>,
}
