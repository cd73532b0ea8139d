use crate::config::Settings;
use anyhow::{anyhow, Result};
use chainsweep_core::{chain, BackupCatalog, JsonStore};
use clap::Args;

#[derive(Args)]
pub struct NextCommand {
    #[arg(help = "Name of the backup")]
    backup: String,
}

impl NextCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let settings = Settings::resolve(cli)?;
        let store = JsonStore::new(&settings.store);
        let record = store.get(&settings.namespace, &self.backup).await?;

        if !record.is_volume_snapshot() {
            return Err(anyhow!("backup {} is not a volume-snapshot backup", record.key()));
        }

        match chain::find_successor(&store, &record).await {
            Some(next) => println!("{}", next.name),
            None => println!("No later volume-snapshot backup after {}", record.key()),
        }
        Ok(())
    }
}
