use crate::config::Settings;
use anyhow::{anyhow, Result};
use chainsweep_backends::{BackendRemover, BackendSizeCalculator};
use chainsweep_core::{CleanManager, CleanOptions, JsonStore, TargetOutcome};
use clap::Args;
use std::sync::Arc;
use tracing::info;

#[derive(Args)]
pub struct CleanCommand {
    #[arg(help = "Name of the backup to clean")]
    backup: String,
}

impl CleanCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let settings = Settings::resolve(cli)?;
        info!("Using record store at: {}", settings.store.display());

        let store = Arc::new(JsonStore::new(&settings.store));
        let mut remover = BackendRemover::new();
        if let Some(concurrency) = settings.delete_concurrency {
            remover = remover.with_default_concurrency(concurrency);
        }

        let options = CleanOptions {
            namespace: settings.namespace.clone(),
            backup_name: self.backup.clone(),
        };
        let cancel = crate::cancel_on_termination(format!("clean {}", options));

        let manager = CleanManager::new(
            store.clone(),
            store,
            Arc::new(remover),
            Arc::new(BackendSizeCalculator),
            options,
        );

        let report = manager.process_clean_backup(&cancel).await?;

        match report.outcome {
            TargetOutcome::Cleaned => println!("Cleaned backup {}", report.backup),
            TargetOutcome::PathEmpty => println!("Backup {} has no backup path, marked as failed", report.backup),
            TargetOutcome::CleanFailed => println!("Failed to clean backup {}", report.backup),
        }

        if let Some(successor) = &report.successor {
            match &successor.result {
                Ok(()) => println!(
                    "Updated size of next volume-snapshot backup {} to {}",
                    successor.name, successor.size.backup_size_readable
                ),
                Err(e) => println!("Could not update size of backup {}: {}", successor.name, e),
            }
        }

        let backup = report.backup.clone();
        let path_empty = report.outcome == TargetOutcome::PathEmpty;
        report
            .into_result()
            .map_err(|e| anyhow!("clean backup {} failed: {}", backup, e))?;

        if path_empty {
            return Err(anyhow!("backup {} path is empty", backup));
        }
        Ok(())
    }
}
