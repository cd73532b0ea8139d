//! Navigation of the incremental volume-snapshot chain.
//!
//! Volume snapshots are point-in-time backups, so the chain is ordered by
//! start time. Records without a start time sort first; equal start times
//! are ordered by name so the result never depends on listing order.

use crate::catalog::{BackupCatalog, Selector};
use crate::BackupRecord;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Total order over backups: start time ascending, then name.
pub fn chain_order(a: &BackupRecord, b: &BackupRecord) -> Ordering {
    a.status
        .time_started
        .cmp(&b.status.time_started)
        .then_with(|| a.name.cmp(&b.name))
}

pub fn sort_chronologically(records: &mut [BackupRecord]) {
    records.sort_by(chain_order);
}

/// First volume-snapshot backup in `records`, skipping any other mode.
pub fn first_volume_snapshot(records: &[BackupRecord]) -> Option<&BackupRecord> {
    records.iter().find(|r| r.is_volume_snapshot())
}

/// Next volume-snapshot backup after `target` in an already sorted list.
pub fn successor_in<'a>(sorted: &'a [BackupRecord], target: &str) -> Option<&'a BackupRecord> {
    let position = sorted.iter().position(|r| r.name == target)?;
    first_volume_snapshot(&sorted[position + 1..])
}

/// Finds the chain successor of `target` in its namespace.
///
/// Best effort: a failed listing or a target missing from the listing both
/// yield `None`.
pub async fn find_successor(catalog: &dyn BackupCatalog, target: &BackupRecord) -> Option<BackupRecord> {
    let mut records = match catalog.list(&target.namespace, &Selector::everything()).await {
        Ok(records) => records,
        Err(e) => {
            warn!(
                backup = %target.key(),
                error = %e,
                "Failed to list backups while looking up the next volume-snapshot backup"
            );
            return None;
        }
    };

    sort_chronologically(&mut records);

    if !records.iter().any(|r| r.name == target.name) {
        debug!(backup = %target.key(), "Backup not present in catalog listing");
        return None;
    }

    successor_in(&records, &target.name).cloned()
}
