use crate::backend::Backend;
use chainsweep_core::{Error, Result, StorageProvider};
use serde::{Deserialize, Serialize};

/// One volume's snapshot in a volume-snapshot backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub volume_id: String,
    pub snapshot_id: String,
    /// Object holding the snapshot data, relative to the storage root.
    pub path: String,
}

/// Metadata written next to a volume-snapshot backup at
/// `<prefix>/backupmeta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshotMeta {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub volumes: Vec<VolumeSnapshot>,
}

impl VolumeSnapshotMeta {
    pub async fn load(backend: &dyn Backend, storage: &StorageProvider) -> Result<Self> {
        let path = storage.backup_meta_path();
        let data = backend
            .read(&path)
            .await
            .map_err(|e| Error::Backend(format!("backup meta {} not found: {}", path, e)))?;
        serde_json::from_slice(&data).map_err(|e| Error::Backend(format!("invalid backup meta {}: {}", path, e)))
    }

    pub fn snapshot_paths(&self) -> impl Iterator<Item = &str> {
        self.volumes.iter().map(|v| v.path.as_str())
    }
}
