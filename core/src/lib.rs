pub mod catalog;
pub mod chain;
pub mod cleanup;
pub mod error;
pub mod manager;
pub mod report;
pub mod store;
pub mod types;

pub use catalog::{BackupCatalog, Selector, StatusUpdater};
pub use cleanup::{ArtifactRemover, CleanupPlan, SizeCalculator, StorageKind, StorageOptions};
pub use error::{AggregateError, Error, Result};
pub use manager::{CleanManager, CleanOptions, CleanReport, SuccessorReport};
pub use report::{OutcomeReporter, TargetOutcome};
pub use store::{JsonStore, MemoryStore};
pub use types::*;
