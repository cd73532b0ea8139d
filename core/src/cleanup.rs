//! Cleanup dispatch: picks one deletion primitive per backup.

use crate::{BackupRecord, Error, Result, StorageProvider, ToolDescriptor};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    S3,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::S3 => write!(f, "s3"),
        }
    }
}

/// Generic remote-storage options derived from a [`StorageProvider`].
///
/// Carries only where the storage is; the object to delete is passed
/// separately as the backup's artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    pub kind: StorageKind,
    /// Local root directory or bucket name.
    pub location: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl StorageOptions {
    pub fn from_provider(provider: &StorageProvider) -> Self {
        match provider {
            StorageProvider::Local { root, .. } => Self {
                kind: StorageKind::Local,
                location: root.display().to_string(),
                region: None,
                endpoint: None,
            },
            StorageProvider::S3 {
                bucket,
                region,
                endpoint,
                ..
            } => Self {
                kind: StorageKind::S3,
                location: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
            },
        }
    }

    /// Options as `--<kind>.<key>=<value>` flags.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.kind {
            StorageKind::Local => args.push(format!("--local.root={}", self.location)),
            StorageKind::S3 => args.push(format!("--s3.bucket={}", self.location)),
        }
        if let Some(region) = &self.region {
            args.push(format!("--{}.region={}", self.kind, region));
        }
        if let Some(endpoint) = &self.endpoint {
            args.push(format!("--{}.endpoint={}", self.kind, endpoint));
        }
        args
    }

    pub fn local_root(&self) -> Option<PathBuf> {
        match self.kind {
            StorageKind::Local => Some(PathBuf::from(&self.location)),
            StorageKind::S3 => None,
        }
    }
}

/// Deletion primitives. Each returns an error whose text ends up verbatim in
/// the `Failed` condition message, and should return promptly with
/// `Error::Cancelled` once `cancel` fires.
#[async_trait]
pub trait ArtifactRemover: Send + Sync {
    /// Removes the backup metadata and every volume snapshot it references.
    async fn delete_volume_snapshot_chain(&self, record: &BackupRecord, cancel: &CancellationToken) -> Result<()>;

    /// Removes backup data with the dedicated backup tool's settings.
    async fn delete_with_tool(
        &self,
        record: &BackupRecord,
        tool: &ToolDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Removes everything under `path` in the storage described by `options`.
    async fn delete_remote(&self, path: &str, options: &StorageOptions, cancel: &CancellationToken) -> Result<()>;
}

/// Computes the current size of a volume-snapshot backup.
#[async_trait]
pub trait SizeCalculator: Send + Sync {
    async fn volume_snapshot_size(&self, storage: &StorageProvider, cancel: &CancellationToken) -> Result<u64>;
}

/// The deletion strategy for one backup, resolved once from its mode and
/// tool descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupPlan {
    VolumeSnapshot,
    DedicatedTool(ToolDescriptor),
    Generic(StorageOptions),
}

impl CleanupPlan {
    pub fn for_record(record: &BackupRecord) -> Self {
        if record.is_volume_snapshot() {
            CleanupPlan::VolumeSnapshot
        } else if let Some(tool) = &record.spec.tool {
            CleanupPlan::DedicatedTool(tool.clone())
        } else {
            CleanupPlan::Generic(StorageOptions::from_provider(&record.spec.storage))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CleanupPlan::VolumeSnapshot => "volume-snapshot",
            CleanupPlan::DedicatedTool(_) => "dedicated-tool",
            CleanupPlan::Generic(_) => "generic",
        }
    }

    /// Runs the selected primitive exactly once.
    pub async fn execute(
        &self,
        remover: &dyn ArtifactRemover,
        record: &BackupRecord,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("clean {}", record.key())));
        }

        info!(backup = %record.key(), plan = self.name(), "Deleting backup data");
        match self {
            CleanupPlan::VolumeSnapshot => remover.delete_volume_snapshot_chain(record, cancel).await,
            CleanupPlan::DedicatedTool(tool) => remover.delete_with_tool(record, tool, cancel).await,
            CleanupPlan::Generic(options) => {
                debug!(backup = %record.key(), options = ?options.to_args(), "Using generic storage options");
                remover
                    .delete_remote(&record.status.backup_path, options, cancel)
                    .await
            }
        }
    }
}
