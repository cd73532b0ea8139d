use crate::{BackupCondition, BackupRecord, BackupSizeUpdate, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Label selector used when listing backups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    labels: BTreeMap<String, String>,
}

impl Selector {
    /// Matches every record.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn matching<K, V, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses `key=value` pairs as given on the command line.
    pub fn parse(pairs: &[String]) -> Result<Self> {
        let mut labels = BTreeMap::new();
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| crate::Error::Other(format!("invalid selector '{}', expected key=value", pair)))?;
            labels.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { labels })
    }

    pub fn is_everything(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn matches(&self, record: &BackupRecord) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| record.labels.get(k) == Some(v))
    }
}

/// Read access to backup records. Results may be stale relative to the
/// authoritative store.
#[async_trait]
pub trait BackupCatalog: Send + Sync {
    /// Returns `Error::BackupNotFound` when the record does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<BackupRecord>;

    /// Records in `namespace` matching `selector`, in no particular order.
    async fn list(&self, namespace: &str, selector: &Selector) -> Result<Vec<BackupRecord>>;
}

/// Persists conditions (and optionally a new size) onto a backup record.
///
/// Implementations append the condition, so two calls for the same record
/// with different condition types keep both.
#[async_trait]
pub trait StatusUpdater: Send + Sync {
    async fn update(
        &self,
        record: &BackupRecord,
        condition: BackupCondition,
        size: Option<BackupSizeUpdate>,
    ) -> Result<()>;
}
