use crate::backend::{Backend, ObjectInfo};
use async_trait::async_trait;
use bytes::Bytes;
use chainsweep_core::{Error, Result, StorageKind};
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path.trim_start_matches('/'))
    }

    /// Metadata of `full_path`, or `None` when nothing is there.
    async fn metadata(full_path: &Path) -> Result<Option<Metadata>> {
        match fs::metadata(full_path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn relative(&self, full_path: &Path) -> Option<String> {
        full_path
            .strip_prefix(&self.base_path)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(path)).await?)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let data = fs::read(self.full_path(path))
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path, e)))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full_path, &data)
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path, e)))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        let removed = match Self::metadata(&full_path).await? {
            Some(metadata) if metadata.is_dir() => fs::remove_dir_all(&full_path).await,
            Some(_) => fs::remove_file(&full_path).await,
            None => return Ok(()),
        };
        match removed {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(Error::Backend(format!("Failed to delete {}: {}", path, e)))
            }
            _ => Ok(()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix);
        let mut results = Vec::new();

        match Self::metadata(&full_path).await? {
            None => return Ok(results),
            Some(metadata) if !metadata.is_dir() => {
                results.extend(self.relative(&full_path));
                return Ok(results);
            }
            Some(_) => {}
        }

        let mut pending = vec![full_path];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(relative) = self.relative(&path) {
                    results.push(relative);
                }
            }
        }

        results.sort();
        Ok(results)
    }

    async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        let metadata = fs::metadata(self.full_path(path))
            .await
            .map_err(|e| Error::Backend(format!("Failed to stat {}: {}", path, e)))?;

        let modified = metadata
            .modified()
            .map_err(|e| Error::Backend(format!("Failed to get modified time: {}", e)))?;
        let modified_dt: DateTime<Utc> = modified.into();

        Ok(ObjectInfo {
            path: path.to_string(),
            size: metadata.len(),
            modified: modified_dt,
        })
    }

    fn backend_type(&self) -> StorageKind {
        StorageKind::Local
    }
}
