use crate::catalog::StatusUpdater;
use crate::{AggregateError, BackupCondition, BackupRecord, BackupSizeUpdate, ConditionType, Error, Result};
use tracing::{error, info};

pub const REASON_BACKUP_PATH_IS_EMPTY: &str = "BackupPathIsEmpty";
pub const REASON_CLEAN_BACKUP_DATA_FAILED: &str = "CleanBackupDataFailed";

/// Which condition was written onto the cleaned backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    PathEmpty,
    Cleaned,
    CleanFailed,
}

impl TargetOutcome {
    pub fn condition_type(&self) -> ConditionType {
        match self {
            TargetOutcome::Cleaned => ConditionType::Clean,
            TargetOutcome::PathEmpty | TargetOutcome::CleanFailed => ConditionType::Failed,
        }
    }
}

/// Turns cleanup outcomes into status conditions.
pub struct OutcomeReporter<'a> {
    updater: &'a dyn StatusUpdater,
}

impl<'a> OutcomeReporter<'a> {
    pub fn new(updater: &'a dyn StatusUpdater) -> Self {
        Self { updater }
    }

    pub async fn report_empty_path(&self, record: &BackupRecord) -> Result<()> {
        error!(backup = %record.key(), "Backup path is empty");
        let condition = BackupCondition::failed(
            REASON_BACKUP_PATH_IS_EMPTY,
            format!("the cluster {} backup path is empty", record.key()),
        );
        self.updater.update(record, condition, None).await
    }

    /// Records the outcome of the deletion. A failed cleanup is returned as
    /// an aggregate with the status write's own error, so the caller sees the
    /// cleanup failure even when the `Failed` condition was stored.
    pub async fn report_cleanup(&self, record: &BackupRecord, cleanup: Result<()>) -> (TargetOutcome, Result<()>) {
        match cleanup {
            Ok(()) => {
                info!(backup = %record.key(), path = %record.status.backup_path, "Clean backup succeeded");
                let written = self
                    .updater
                    .update(record, BackupCondition::new(ConditionType::Clean), None)
                    .await;
                (TargetOutcome::Cleaned, written)
            }
            Err(err) => {
                error!(
                    backup = %record.key(),
                    path = %record.status.backup_path,
                    error = %err,
                    "Clean backup failed"
                );
                let condition = BackupCondition::failed(REASON_CLEAN_BACKUP_DATA_FAILED, err.to_string());
                let written = self.updater.update(record, condition, None).await;

                let result = match AggregateError::from_results([Err(err), written]) {
                    Some(agg) => Err(Error::Aggregate(agg)),
                    None => Ok(()),
                };
                (TargetOutcome::CleanFailed, result)
            }
        }
    }

    pub async fn report_successor_size(&self, successor: &BackupRecord, size: BackupSizeUpdate) -> Result<()> {
        self.updater
            .update(successor, BackupCondition::new(ConditionType::Complete), Some(size))
            .await
    }
}
