pub mod backend;
pub mod local;
pub mod meta;
pub mod remover;
pub mod s3;

pub use backend::{Backend, ObjectInfo};
pub use local::LocalBackend;
pub use meta::{VolumeSnapshot, VolumeSnapshotMeta};
pub use remover::{BackendRemover, BackendSizeCalculator};
pub use s3::S3Backend;

use chainsweep_core::{Error, Result, StorageKind, StorageOptions};
use tracing::debug;

/// Opens the backend described by generic storage options.
pub async fn open_backend(options: &StorageOptions) -> Result<Box<dyn Backend>> {
    debug!(args = ?options.to_args(), "Opening storage backend");
    match options.kind {
        StorageKind::Local => {
            let root = options
                .local_root()
                .ok_or_else(|| Error::InvalidStorage("local storage requires a root".to_string()))?;
            Ok(Box::new(LocalBackend::new(root)))
        }
        StorageKind::S3 => Ok(Box::new(S3Backend::from_options(options).await?)),
    }
}
