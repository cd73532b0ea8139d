use crate::backend::Backend;
use crate::meta::VolumeSnapshotMeta;
use crate::open_backend;
use async_trait::async_trait;
use chainsweep_core::{
    ArtifactRemover, BackupRecord, Error, Result, SizeCalculator, StorageOptions, StorageProvider, ToolDescriptor,
};
use futures::stream::{self, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_DELETE_CONCURRENCY: usize = 10;

async fn cancellable<T>(cancel: &CancellationToken, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(what.to_string())),
        result = fut => result,
    }
}

/// Normalizes a backup's artifact path relative to the storage root.
///
/// Empty and `.` segments are dropped and `..` is rejected, so a path can
/// never resolve to the root itself or escape it.
pub fn artifact_path(path: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::InvalidStorage(format!(
                    "backup path {:?} must not contain '..'",
                    path
                )));
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(Error::InvalidStorage(format!(
            "backup path {:?} resolves to the storage root",
            path
        )));
    }
    Ok(segments.join("/"))
}

/// Lists the objects under `path`, treating an empty listing as missing data.
async fn objects_under(backend: &dyn Backend, path: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
    let objects = cancellable(cancel, path, backend.list(path)).await?;
    if objects.is_empty() {
        return Err(Error::Backend(format!("backup data {} not found", path)));
    }
    Ok(objects)
}

/// [`ArtifactRemover`] backed by object storage.
pub struct BackendRemover {
    default_concurrency: usize,
}

impl BackendRemover {
    pub fn new() -> Self {
        Self {
            default_concurrency: DEFAULT_DELETE_CONCURRENCY,
        }
    }

    pub fn with_default_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency.max(1);
        self
    }

    async fn delete_all(
        &self,
        backend: &dyn Backend,
        objects: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        for object in objects {
            cancellable(cancel, object, backend.delete(object)).await?;
        }
        Ok(())
    }
}

impl Default for BackendRemover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactRemover for BackendRemover {
    async fn delete_volume_snapshot_chain(&self, record: &BackupRecord, cancel: &CancellationToken) -> Result<()> {
        let storage = &record.spec.storage;
        let path = &artifact_path(&record.status.backup_path)?;
        let backend = open_backend(&StorageOptions::from_provider(storage)).await?;
        let meta = cancellable(cancel, "read backup meta", VolumeSnapshotMeta::load(backend.as_ref(), storage)).await?;

        // Snapshots go first: the metadata is the only record of which
        // snapshots belong to this backup.
        let snapshots: Vec<String> = meta.snapshot_paths().map(str::to_string).collect();
        info!(backup = %record.key(), snapshots = snapshots.len(), "Deleting volume snapshots");
        self.delete_all(backend.as_ref(), &snapshots, cancel).await?;

        let meta_path = storage.backup_meta_path();
        let remaining: Vec<String> = cancellable(cancel, path, backend.list(path))
            .await?
            .into_iter()
            .filter(|object| *object != meta_path)
            .collect();
        self.delete_all(backend.as_ref(), &remaining, cancel).await?;

        cancellable(cancel, &meta_path, backend.delete(&meta_path)).await?;
        cancellable(cancel, path, backend.delete(path)).await?;

        debug!(backup = %record.key(), files = remaining.len(), "Deleted volume-snapshot backup meta");
        Ok(())
    }

    async fn delete_with_tool(
        &self,
        record: &BackupRecord,
        tool: &ToolDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = &artifact_path(&record.status.backup_path)?;
        let backend = open_backend(&StorageOptions::from_provider(&record.spec.storage)).await?;
        let objects = objects_under(backend.as_ref(), path, cancel).await?;
        let concurrency = tool.concurrency.unwrap_or(self.default_concurrency).max(1);

        info!(
            backup = %record.key(),
            cluster = %tool.cluster,
            objects = objects.len(),
            concurrency,
            "Deleting backup data in batches"
        );

        let backend = backend.as_ref();
        let deletions: Vec<_> = objects
            .iter()
            .map(|object| {
                let deleted = cancellable(cancel, object, backend.delete(object));
                async move { (object.clone(), deleted.await) }
            })
            .collect();
        let results: Vec<(String, Result<()>)> = stream::iter(deletions)
            .buffer_unordered(concurrency)
            .collect()
            .await;
        let failures: Vec<(String, Error)> = results
            .into_iter()
            .filter_map(|(object, result)| result.err().map(|e| (object, e)))
            .collect();

        if let Some((object, first)) = failures.first() {
            warn!(backup = %record.key(), failed = failures.len(), "Some backup objects were not deleted");
            return Err(Error::Backend(format!(
                "failed to delete {} of {} objects under {}, first error on {}: {}",
                failures.len(),
                objects.len(),
                path,
                object,
                first
            )));
        }

        cancellable(cancel, path, backend.delete(path)).await
    }

    async fn delete_remote(&self, path: &str, options: &StorageOptions, cancel: &CancellationToken) -> Result<()> {
        let path = artifact_path(path)?;
        let path = path.as_str();
        let backend = open_backend(options).await?;
        let objects = objects_under(backend.as_ref(), path, cancel).await?;
        debug!(path, objects = objects.len(), "Deleting backup data");

        self.delete_all(backend.as_ref(), &objects, cancel).await?;
        cancellable(cancel, path, backend.delete(path)).await
    }
}

/// Sums the sizes of the snapshot objects a volume-snapshot backup still
/// references.
#[derive(Debug, Default)]
pub struct BackendSizeCalculator;

#[async_trait]
impl SizeCalculator for BackendSizeCalculator {
    async fn volume_snapshot_size(&self, storage: &StorageProvider, cancel: &CancellationToken) -> Result<u64> {
        let backend = open_backend(&StorageOptions::from_provider(storage)).await?;
        let meta = cancellable(cancel, "read backup meta", VolumeSnapshotMeta::load(backend.as_ref(), storage)).await?;

        let mut total = 0u64;
        for path in meta.snapshot_paths() {
            if !cancellable(cancel, path, backend.exists(path)).await? {
                debug!(path, "Snapshot object missing, not counted");
                continue;
            }
            total += cancellable(cancel, path, backend.stat(path)).await?.size;
        }
        Ok(total)
    }
}
