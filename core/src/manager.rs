use crate::catalog::{BackupCatalog, StatusUpdater};
use crate::chain;
use crate::cleanup::{ArtifactRemover, CleanupPlan, SizeCalculator};
use crate::report::{OutcomeReporter, TargetOutcome};
use crate::{BackupRecord, BackupSizeUpdate, Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Identifies the backup a [`CleanManager`] works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOptions {
    pub namespace: String,
    pub backup_name: String,
}

impl fmt::Display for CleanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.backup_name)
    }
}

/// Result of the size recomputation for a chain successor. Kept apart from
/// the cleaned backup's own result.
#[derive(Debug)]
pub struct SuccessorReport {
    pub name: String,
    pub size: BackupSizeUpdate,
    pub result: Result<()>,
}

/// Everything one cleanup invocation did.
#[derive(Debug)]
pub struct CleanReport {
    pub backup: String,
    pub outcome: TargetOutcome,
    /// Aggregated errors for the cleaned backup.
    pub result: Result<()>,
    pub successor: Option<SuccessorReport>,
}

impl CleanReport {
    pub fn is_success(&self) -> bool {
        self.outcome == TargetOutcome::Cleaned && self.result.is_ok()
    }

    /// The cleaned backup's result. Successor errors are already logged and
    /// never affect it.
    pub fn into_result(self) -> Result<()> {
        self.result
    }
}

/// Cleans the artifacts of one backup and records the outcome on it.
pub struct CleanManager {
    catalog: Arc<dyn BackupCatalog>,
    status_updater: Arc<dyn StatusUpdater>,
    remover: Arc<dyn ArtifactRemover>,
    size_calculator: Arc<dyn SizeCalculator>,
    options: CleanOptions,
}

impl CleanManager {
    pub fn new(
        catalog: Arc<dyn BackupCatalog>,
        status_updater: Arc<dyn StatusUpdater>,
        remover: Arc<dyn ArtifactRemover>,
        size_calculator: Arc<dyn SizeCalculator>,
        options: CleanOptions,
    ) -> Self {
        Self {
            catalog,
            status_updater,
            remover,
            size_calculator,
            options,
        }
    }

    pub fn options(&self) -> &CleanOptions {
        &self.options
    }

    /// Looks up the configured backup and cleans it. Only a failed lookup is
    /// returned as `Err`; every other failure is in the report.
    pub async fn process_clean_backup(&self, cancel: &CancellationToken) -> Result<CleanReport> {
        let record = self
            .catalog
            .get(&self.options.namespace, &self.options.backup_name)
            .await
            .map_err(|e| match e {
                Error::BackupNotFound { .. } => e,
                other => Error::Catalog(format!("can't find backup {}: {}", self.options, other)),
            })?;

        Ok(self.perform_clean_backup(&record, cancel).await)
    }

    pub async fn perform_clean_backup(&self, record: &BackupRecord, cancel: &CancellationToken) -> CleanReport {
        let reporter = OutcomeReporter::new(self.status_updater.as_ref());

        if record.status.backup_path.is_empty() {
            return CleanReport {
                backup: record.key(),
                outcome: TargetOutcome::PathEmpty,
                result: reporter.report_empty_path(record).await,
                successor: None,
            };
        }

        let plan = CleanupPlan::for_record(record);
        let mut successor = None;

        let cleanup = match &plan {
            CleanupPlan::VolumeSnapshot => {
                // Every volume snapshot is incremental, so deleting this one
                // changes the size of the next one in the chain.
                let next = chain::find_successor(self.catalog.as_ref(), record).await;
                if next.is_none() {
                    info!(backup = %record.key(), "No later volume-snapshot backup to resize");
                }

                let result = plan.execute(self.remover.as_ref(), record, cancel).await;

                if let Some(next) = next {
                    successor = Some(self.update_successor_size(&next, cancel).await);
                }
                result
            }
            _ => plan.execute(self.remover.as_ref(), record, cancel).await,
        };

        let (outcome, result) = reporter.report_cleanup(record, cleanup).await;

        CleanReport {
            backup: record.key(),
            outcome,
            result,
            successor,
        }
    }

    /// Recomputes and stores the size of a volume-snapshot backup. A failed
    /// size calculation still writes a (zero) size.
    pub async fn update_successor_size(&self, successor: &BackupRecord, cancel: &CancellationToken) -> SuccessorReport {
        let bytes = match self
            .size_calculator
            .volume_snapshot_size(&successor.spec.storage, cancel)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(backup = %successor.key(), error = %e, "Failed to calculate volume-snapshot backup size");
                0
            }
        };

        let size = BackupSizeUpdate::from_bytes(bytes);
        let result = OutcomeReporter::new(self.status_updater.as_ref())
            .report_successor_size(successor, size.clone())
            .await;

        match &result {
            Ok(()) => info!(
                backup = %successor.key(),
                size = %size.backup_size_readable,
                "Updated volume-snapshot backup size"
            ),
            Err(e) => error!(backup = %successor.key(), error = %e, "Failed to update volume-snapshot backup size"),
        }

        SuccessorReport {
            name: successor.name.clone(),
            size,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Selector;
    use crate::cleanup::StorageOptions;
    use crate::report::{REASON_BACKUP_PATH_IS_EMPTY, REASON_CLEAN_BACKUP_DATA_FAILED};
    use crate::store::MemoryStore;
    use crate::{BackupCondition, BackupMode, ConditionType, StorageProvider, ToolDescriptor};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        VolumeSnapshot(String),
        Tool(String, String),
        Remote(String, StorageOptions),
    }

    /// Remover that records calls and fails for configured paths or once an
    /// artifact was already removed.
    #[derive(Default)]
    struct FakeRemover {
        calls: Mutex<Vec<Call>>,
        failing: HashSet<String>,
        removed: Mutex<HashSet<String>>,
    }

    impl FakeRemover {
        fn failing(paths: &[&str]) -> Self {
            Self {
                failing: paths.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn remove(&self, path: &str) -> Result<()> {
            if self.failing.contains(path) {
                return Err(Error::Backend(format!("permission denied deleting {}", path)));
            }
            if !self.removed.lock().unwrap().insert(path.to_string()) {
                return Err(Error::Backend(format!("{} not found", path)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ArtifactRemover for FakeRemover {
        async fn delete_volume_snapshot_chain(&self, record: &BackupRecord, _: &CancellationToken) -> Result<()> {
            self.calls.lock().unwrap().push(Call::VolumeSnapshot(record.name.clone()));
            self.remove(&record.status.backup_path)
        }

        async fn delete_with_tool(
            &self,
            record: &BackupRecord,
            tool: &ToolDescriptor,
            _: &CancellationToken,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Tool(record.name.clone(), tool.cluster.clone()));
            self.remove(&record.status.backup_path)
        }

        async fn delete_remote(&self, path: &str, options: &StorageOptions, _: &CancellationToken) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Remote(path.to_string(), options.clone()));
            self.remove(path)
        }
    }

    struct FixedSize(Result<u64>);

    #[async_trait]
    impl SizeCalculator for FixedSize {
        async fn volume_snapshot_size(&self, _: &StorageProvider, _: &CancellationToken) -> Result<u64> {
            match &self.0 {
                Ok(bytes) => Ok(*bytes),
                Err(e) => Err(Error::Backend(e.to_string())),
            }
        }
    }

    /// Delegates to a [`MemoryStore`] but rejects writes for one backup.
    struct FlakyUpdater {
        store: Arc<MemoryStore>,
        reject: String,
    }

    #[async_trait]
    impl StatusUpdater for FlakyUpdater {
        async fn update(
            &self,
            record: &BackupRecord,
            condition: BackupCondition,
            size: Option<BackupSizeUpdate>,
        ) -> Result<()> {
            if record.name == self.reject {
                return Err(Error::StatusUpdate {
                    name: record.key(),
                    reason: "resource version conflict".to_string(),
                });
            }
            self.store.update(record, condition, size).await
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        remover: Arc<FakeRemover>,
        manager: CleanManager,
    }

    async fn harness(
        records: Vec<BackupRecord>,
        target: &str,
        remover: FakeRemover,
        size: Result<u64>,
    ) -> Harness {
        let store = Arc::new(MemoryStore::new());
        for r in records {
            store.insert(r).await;
        }
        let remover = Arc::new(remover);
        let manager = CleanManager::new(
            store.clone(),
            store.clone(),
            remover.clone(),
            Arc::new(FixedSize(size)),
            CleanOptions {
                namespace: "tidb".to_string(),
                backup_name: target.to_string(),
            },
        );
        Harness { store, remover, manager }
    }

    fn backup(name: &str, secs: i64, mode: BackupMode) -> BackupRecord {
        BackupRecord::new("tidb", name)
            .with_mode(mode)
            .with_time_started(Utc.timestamp_opt(secs, 0).unwrap())
            .with_backup_path(name)
            .with_storage(StorageProvider::S3 {
                bucket: "backups".to_string(),
                prefix: name.to_string(),
                region: None,
                endpoint: None,
            })
    }

    async fn conditions(store: &MemoryStore, name: &str) -> Vec<BackupCondition> {
        store.get("tidb", name).await.unwrap().status.conditions
    }

    #[tokio::test]
    async fn test_empty_path_fails_without_deleting() {
        let mut record = backup("a", 1, BackupMode::VolumeSnapshot);
        record.status.backup_path.clear();
        let h = harness(
            vec![record, backup("b", 2, BackupMode::VolumeSnapshot)],
            "a",
            FakeRemover::default(),
            Ok(100),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.outcome, TargetOutcome::PathEmpty);
        assert!(report.result.is_ok());
        assert!(report.successor.is_none());
        assert!(h.remover.calls().is_empty());

        let written = conditions(&h.store, "a").await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].condition_type, ConditionType::Failed);
        assert_eq!(written[0].reason, REASON_BACKUP_PATH_IS_EMPTY);
        assert_eq!(written[0].message, "the cluster tidb/a backup path is empty");
        assert!(conditions(&h.store, "b").await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_backup_is_lookup_failure() {
        let h = harness(Vec::new(), "ghost", FakeRemover::default(), Ok(0)).await;
        let err = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::BackupNotFound { .. }));
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_volume_snapshot_cleanup_resizes_successor() {
        let h = harness(
            vec![
                backup("a", 1, BackupMode::VolumeSnapshot),
                backup("b", 2, BackupMode::Normal),
                backup("c", 3, BackupMode::VolumeSnapshot),
            ],
            "a",
            FakeRemover::default(),
            Ok(82_854_982),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(h.remover.calls(), vec![Call::VolumeSnapshot("a".to_string())]);

        let successor = report.successor.unwrap();
        assert_eq!(successor.name, "c");
        assert!(successor.result.is_ok());

        let c = h.store.get("tidb", "c").await.unwrap();
        assert_eq!(c.status.backup_size, 82_854_982);
        assert_eq!(c.status.backup_size_readable, "83 MB");
        assert_eq!(c.latest_condition().unwrap().condition_type, ConditionType::Complete);

        let a = conditions(&h.store, "a").await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].condition_type, ConditionType::Clean);
        assert!(a[0].reason.is_empty() && a[0].message.is_empty());
        assert!(conditions(&h.store, "b").await.is_empty());
    }

    #[tokio::test]
    async fn test_successor_resized_even_when_deletion_fails() {
        let h = harness(
            vec![
                backup("a", 1, BackupMode::VolumeSnapshot),
                backup("b", 2, BackupMode::VolumeSnapshot),
            ],
            "a",
            FakeRemover::failing(&["a"]),
            Ok(4096),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, TargetOutcome::CleanFailed);
        assert!(report.result.is_err());

        let b = h.store.get("tidb", "b").await.unwrap();
        assert_eq!(b.status.backup_size, 4096);
        assert_eq!(b.status.backup_size_readable, "4.1 kB");

        let a = conditions(&h.store, "a").await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].reason, REASON_CLEAN_BACKUP_DATA_FAILED);
        assert!(a[0].message.contains("permission denied deleting a"));
    }

    #[tokio::test]
    async fn test_no_successor_write_for_last_volume_snapshot() {
        let h = harness(
            vec![
                backup("a", 1, BackupMode::VolumeSnapshot),
                backup("b", 2, BackupMode::VolumeSnapshot),
                backup("c", 3, BackupMode::Normal),
            ],
            "b",
            FakeRemover::default(),
            Ok(1),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        assert!(report.successor.is_none());
        assert!(conditions(&h.store, "a").await.is_empty());
        assert!(conditions(&h.store, "c").await.is_empty());
    }

    #[tokio::test]
    async fn test_size_calculation_failure_writes_zero_size() {
        let mut b = backup("b", 2, BackupMode::VolumeSnapshot);
        b.status.backup_size = 999;
        let h = harness(
            vec![backup("a", 1, BackupMode::VolumeSnapshot), b],
            "a",
            FakeRemover::default(),
            Err(Error::Backend("describe snapshots throttled".to_string())),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        let b = h.store.get("tidb", "b").await.unwrap();
        assert_eq!(b.status.backup_size, 0);
        assert_eq!(b.status.backup_size_readable, "0 B");
    }

    #[tokio::test]
    async fn test_successor_write_failure_does_not_affect_target() {
        let store = Arc::new(MemoryStore::new());
        store.insert(backup("a", 1, BackupMode::VolumeSnapshot)).await;
        store.insert(backup("b", 2, BackupMode::VolumeSnapshot)).await;
        let manager = CleanManager::new(
            store.clone(),
            Arc::new(FlakyUpdater {
                store: store.clone(),
                reject: "b".to_string(),
            }),
            Arc::new(FakeRemover::default()),
            Arc::new(FixedSize(Ok(10))),
            CleanOptions {
                namespace: "tidb".to_string(),
                backup_name: "a".to_string(),
            },
        );

        let report = manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        assert!(report.successor.as_ref().unwrap().result.is_err());
        assert!(report.into_result().is_ok());
        assert_eq!(conditions(&store, "a").await[0].condition_type, ConditionType::Clean);
    }

    #[tokio::test]
    async fn test_dedicated_tool_chosen_over_generic() {
        let tool = ToolDescriptor {
            cluster: "basic".to_string(),
            ..Default::default()
        };
        let h = harness(
            vec![backup("full", 1, BackupMode::Normal).with_tool(tool)],
            "full",
            FakeRemover::default(),
            Ok(0),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        assert_eq!(
            h.remover.calls(),
            vec![Call::Tool("full".to_string(), "basic".to_string())]
        );
    }

    #[tokio::test]
    async fn test_generic_deletion_uses_backup_path_and_storage_options() {
        let h = harness(
            vec![backup("full", 1, BackupMode::Normal)],
            "full",
            FakeRemover::default(),
            Ok(0),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        assert!(report.is_success());
        let calls = h.remover.calls();
        assert_eq!(calls.len(), 1);
        let Call::Remote(path, options) = &calls[0] else {
            panic!("expected generic deletion, got {:?}", calls[0]);
        };
        assert_eq!(path, "full");
        assert_eq!(options.location, "backups");
    }

    #[tokio::test]
    async fn test_failed_cleanup_with_successful_write_returns_aggregate() {
        let h = harness(
            vec![backup("full", 1, BackupMode::Normal)],
            "full",
            FakeRemover::failing(&["full"]),
            Ok(0),
        )
        .await;

        let report = h.manager.process_clean_backup(&CancellationToken::new()).await.unwrap();
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, Error::Aggregate(_)));
        assert!(err.to_string().contains("permission denied deleting full"));
    }

    #[tokio::test]
    async fn test_second_cleanup_is_ordinary_failure() {
        let h = harness(
            vec![backup("full", 1, BackupMode::Normal)],
            "full",
            FakeRemover::default(),
            Ok(0),
        )
        .await;
        let cancel = CancellationToken::new();

        let first = h.manager.process_clean_backup(&cancel).await.unwrap();
        assert!(first.is_success());

        let second = h.manager.process_clean_backup(&cancel).await.unwrap();
        assert_eq!(second.outcome, TargetOutcome::CleanFailed);
        assert!(second.result.unwrap_err().to_string().contains("not found"));

        let written = conditions(&h.store, "full").await;
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].condition_type, ConditionType::Clean);
        assert_eq!(written[1].condition_type, ConditionType::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_invocation_reports_failure() {
        let h = harness(
            vec![backup("full", 1, BackupMode::Normal)],
            "full",
            FakeRemover::default(),
            Ok(0),
        )
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h.manager.process_clean_backup(&cancel).await.unwrap();
        assert_eq!(report.outcome, TargetOutcome::CleanFailed);
        assert!(h.remover.calls().is_empty());
        assert_eq!(
            h.store.list("tidb", &Selector::everything()).await.unwrap()[0]
                .latest_condition()
                .unwrap()
                .reason,
            REASON_CLEAN_BACKUP_DATA_FAILED
        );
    }
}
