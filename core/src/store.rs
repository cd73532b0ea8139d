//! Record stores implementing both [`BackupCatalog`] and [`StatusUpdater`].

use crate::catalog::{BackupCatalog, Selector, StatusUpdater};
use crate::{BackupCondition, BackupRecord, BackupSizeUpdate, Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Appends `condition` to the record and applies the optional size update.
pub fn apply_update(record: &mut BackupRecord, mut condition: BackupCondition, size: Option<BackupSizeUpdate>) {
    if condition.last_transition_time.is_none() {
        condition.last_transition_time = Some(Utc::now());
    }
    record.status.phase = Some(condition.condition_type);
    record.status.conditions.push(condition);

    if let Some(size) = size {
        record.status.backup_size = size.backup_size;
        record.status.backup_size_readable = size.backup_size_readable;
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(String, String), BackupRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: BackupRecord) {
        let key = (record.namespace.clone(), record.name.clone());
        self.records.write().await.insert(key, record);
    }

    pub async fn remove(&self, namespace: &str, name: &str) -> Option<BackupRecord> {
        self.records
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl BackupCatalog for MemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BackupRecord> {
        self.records
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::BackupNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<BackupRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.namespace == namespace && selector.matches(r))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatusUpdater for MemoryStore {
    async fn update(
        &self,
        record: &BackupRecord,
        condition: BackupCondition,
        size: Option<BackupSizeUpdate>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&(record.namespace.clone(), record.name.clone()))
            .ok_or_else(|| Error::StatusUpdate {
                name: record.key(),
                reason: "backup no longer exists".to_string(),
            })?;
        apply_update(stored, condition, size);
        Ok(())
    }
}

/// Keeps one JSON document per record at `<root>/<namespace>/<name>.json`.
pub struct JsonStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.root.join(namespace).join(format!("{}.json", name))
    }

    /// Writes `record`, replacing any existing document.
    pub async fn save(&self, record: &BackupRecord) -> Result<()> {
        let path = self.record_path(&record.namespace, &record.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(record)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &data).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn load(&self, path: &Path) -> Result<BackupRecord> {
        let data = fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[async_trait]
impl BackupCatalog for JsonStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BackupRecord> {
        let path = self.record_path(namespace, name);
        match self.load(&path).await {
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::BackupNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            other => other,
        }
    }

    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<BackupRecord>> {
        let dir = self.root.join(namespace);
        match fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        }

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = self
                .load(&path)
                .await
                .map_err(|e| Error::Catalog(format!("Failed to load {}: {}", path.display(), e)))?;
            if selector.matches(&record) {
                records.push(record);
            }
        }

        debug!(namespace, count = records.len(), "Listed backups");
        Ok(records)
    }
}

#[async_trait]
impl StatusUpdater for JsonStore {
    async fn update(
        &self,
        record: &BackupRecord,
        condition: BackupCondition,
        size: Option<BackupSizeUpdate>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let path = self.record_path(&record.namespace, &record.name);
        let mut stored = self.load(&path).await.map_err(|e| Error::StatusUpdate {
            name: record.key(),
            reason: e.to_string(),
        })?;

        apply_update(&mut stored, condition, size);

        self.save(&stored).await.map_err(|e| Error::StatusUpdate {
            name: record.key(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackupMode, ConditionType};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_appends_conditions() {
        let store = MemoryStore::new();
        let record = BackupRecord::new("tidb", "a");
        store.insert(record.clone()).await;

        store
            .update(&record, BackupCondition::new(ConditionType::Clean), None)
            .await
            .unwrap();
        store
            .update(
                &record,
                BackupCondition::new(ConditionType::Complete),
                Some(BackupSizeUpdate::from_bytes(2048)),
            )
            .await
            .unwrap();

        let stored = store.get("tidb", "a").await.unwrap();
        assert_eq!(stored.status.conditions.len(), 2);
        assert!(stored.has_condition(ConditionType::Clean));
        assert!(stored.has_condition(ConditionType::Complete));
        assert_eq!(stored.status.phase, Some(ConditionType::Complete));
        assert_eq!(stored.status.backup_size, 2048);
        assert_eq!(stored.status.backup_size_readable, "2.0 kB");
        assert!(stored.status.conditions.iter().all(|c| c.last_transition_time.is_some()));
    }

    #[tokio::test]
    async fn test_memory_store_update_of_missing_record_fails() {
        let store = MemoryStore::new();
        let err = store
            .update(&BackupRecord::new("tidb", "gone"), BackupCondition::new(ConditionType::Clean), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatusUpdate { .. }));
    }

    #[tokio::test]
    async fn test_json_store_roundtrip_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        let a = BackupRecord::new("tidb", "a")
            .with_mode(BackupMode::VolumeSnapshot)
            .with_label("cluster", "basic");
        let b = BackupRecord::new("tidb", "b").with_label("cluster", "other");
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();
        store.save(&BackupRecord::new("prod", "c")).await.unwrap();

        assert_eq!(store.get("tidb", "a").await.unwrap(), a);
        assert_eq!(store.list("tidb", &Selector::everything()).await.unwrap().len(), 2);
        let basic = store
            .list("tidb", &Selector::matching([("cluster", "basic")]))
            .await
            .unwrap();
        assert_eq!(basic.len(), 1);
        assert_eq!(basic[0].name, "a");
        assert!(store.list("empty", &Selector::everything()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_namespace_that_is_not_a_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("tidb"), b"not a namespace").await.unwrap();
        let store = JsonStore::new(dir.path());

        assert!(store.list("tidb", &Selector::everything()).await.unwrap().is_empty());
        assert!(JsonStore::new(dir.path().join("absent"))
            .list("tidb", &Selector::everything())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_json_store_missing_record_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        let err = store.get("tidb", "nope").await.unwrap_err();
        assert!(matches!(err, Error::BackupNotFound { .. }));
    }

    #[tokio::test]
    async fn test_json_store_update_persists() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        let record = BackupRecord::new("tidb", "a");
        store.save(&record).await.unwrap();

        store
            .update(
                &record,
                BackupCondition::failed("CleanBackupDataFailed", "bucket gone"),
                None,
            )
            .await
            .unwrap();

        let stored = store.get("tidb", "a").await.unwrap();
        let condition = stored.latest_condition().unwrap();
        assert_eq!(condition.condition_type, ConditionType::Failed);
        assert_eq!(condition.reason, "CleanBackupDataFailed");
        assert_eq!(condition.message, "bucket gone");
    }
}
