use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackupMode {
    #[default]
    Normal,
    VolumeSnapshot,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Normal => write!(f, "normal"),
            BackupMode::VolumeSnapshot => write!(f, "volume-snapshot"),
        }
    }
}

/// Where a backup's artifacts live.
///
/// `prefix` is unique per backup; volume-snapshot metadata is stored at
/// `<prefix>/backupmeta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageProvider {
    Local {
        root: PathBuf,
        #[serde(default)]
        prefix: String,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl StorageProvider {
    pub fn prefix(&self) -> &str {
        match self {
            StorageProvider::Local { prefix, .. } | StorageProvider::S3 { prefix, .. } => prefix,
        }
    }

    /// Path of the volume-snapshot metadata file, relative to the storage root.
    pub fn backup_meta_path(&self) -> String {
        let prefix = self.prefix().trim_end_matches('/');
        if prefix.is_empty() {
            BACKUP_META_FILE.to_string()
        } else {
            format!("{}/{}", prefix, BACKUP_META_FILE)
        }
    }
}

pub const BACKUP_META_FILE: &str = "backupmeta";

impl Default for StorageProvider {
    fn default() -> Self {
        StorageProvider::Local {
            root: PathBuf::from("."),
            prefix: String::new(),
        }
    }
}

/// Settings for the dedicated backup tool. Its presence routes cleanup of a
/// non-volume-snapshot backup through the tool-aware deletion primitive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub cluster: String,
    #[serde(default)]
    pub cluster_namespace: Option<String>,
    /// Number of objects deleted concurrently.
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupSpec {
    #[serde(default)]
    pub mode: BackupMode,
    #[serde(default)]
    pub tool: Option<ToolDescriptor>,
    #[serde(default)]
    pub storage: StorageProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Scheduled,
    Running,
    Complete,
    Clean,
    Cleaning,
    Failed,
    Invalid,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    #[default]
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Stamped by the status updater when the condition is persisted.
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl BackupCondition {
    pub fn new(condition_type: ConditionType) -> Self {
        Self {
            condition_type,
            status: ConditionStatus::True,
            reason: String::new(),
            message: String::new(),
            last_transition_time: None,
        }
    }

    pub fn failed(reason: &str, message: impl Into<String>) -> Self {
        Self::new(ConditionType::Failed)
            .with_reason(reason)
            .with_message(message)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Freshly computed size applied together with a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSizeUpdate {
    pub backup_size: u64,
    pub backup_size_readable: String,
}

impl BackupSizeUpdate {
    pub fn from_bytes(bytes: u64) -> Self {
        Self {
            backup_size: bytes,
            backup_size_readable: readable_size(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupStatus {
    #[serde(default)]
    pub backup_path: String,
    #[serde(default)]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub backup_size: u64,
    #[serde(default)]
    pub backup_size_readable: String,
    #[serde(default)]
    pub phase: Option<ConditionType>,
    #[serde(default)]
    pub conditions: Vec<BackupCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: BackupSpec,
    #[serde(default)]
    pub status: BackupStatus,
}

impl BackupRecord {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            spec: BackupSpec::default(),
            status: BackupStatus::default(),
        }
    }

    pub fn with_mode(mut self, mode: BackupMode) -> Self {
        self.spec.mode = mode;
        self
    }

    pub fn with_tool(mut self, tool: ToolDescriptor) -> Self {
        self.spec.tool = Some(tool);
        self
    }

    pub fn with_storage(mut self, storage: StorageProvider) -> Self {
        self.spec.storage = storage;
        self
    }

    pub fn with_backup_path(mut self, path: impl Into<String>) -> Self {
        self.status.backup_path = path.into();
        self
    }

    pub fn with_time_started(mut self, time: DateTime<Utc>) -> Self {
        self.status.time_started = Some(time);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn is_volume_snapshot(&self) -> bool {
        self.spec.mode == BackupMode::VolumeSnapshot
    }

    /// `namespace/name`, used in logs and condition messages.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn latest_condition(&self) -> Option<&BackupCondition> {
        self.status.conditions.last()
    }

    pub fn has_condition(&self, condition_type: ConditionType) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.condition_type == condition_type && c.status == ConditionStatus::True)
    }
}

const SIZE_UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Renders a byte count with SI units, e.g. `82854982` -> `83 MB`.
pub fn readable_size(bytes: u64) -> String {
    if bytes < 10 {
        return format!("{} B", bytes);
    }

    let mut exponent = 0;
    let mut threshold: u64 = 1000;
    while exponent < SIZE_UNITS.len() - 1 && bytes >= threshold {
        exponent += 1;
        threshold = threshold.saturating_mul(1000);
    }

    let scaled = bytes as f64 / 1000f64.powi(exponent as i32);
    let rounded = (scaled * 10.0 + 0.5).floor() / 10.0;

    if rounded < 10.0 {
        format!("{:.1} {}", rounded, SIZE_UNITS[exponent])
    } else {
        format!("{:.0} {}", rounded, SIZE_UNITS[exponent])
    }
}
