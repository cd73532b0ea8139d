use crate::config::Settings;
use anyhow::{anyhow, Result};
use chainsweep_core::{chain, BackupCatalog, JsonStore, Selector};
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct ListCommand {
    #[arg(long, help = "Only list backups with this label (key=value)")]
    selector: Vec<String>,

    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,
}

impl ListCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let settings = Settings::resolve(cli)?;
        let store = JsonStore::new(&settings.store);
        let selector = Selector::parse(&self.selector)?;

        info!("Listing backups in namespace: {}", settings.namespace);
        let mut records = store.list(&settings.namespace, &selector).await?;
        chain::sort_chronologically(&mut records);

        let format = self.format.as_deref().unwrap_or("table");

        if records.is_empty() {
            println!("No backups found");
            return Ok(());
        }

        match format {
            "table" => {
                println!("{:<24} {:<16} {:<20} {:<10} {}",
                    "NAME", "MODE", "STARTED", "SIZE", "STATUS");
                println!("{:-<90}", "");

                for record in &records {
                    let started = record.status.time_started
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let status = record.latest_condition()
                        .map(|c| {
                            if c.reason.is_empty() {
                                c.condition_type.to_string()
                            } else {
                                format!("{} ({})", c.condition_type, c.reason)
                            }
                        })
                        .unwrap_or_else(|| "-".to_string());

                    println!("{:<24} {:<16} {:<20} {:<10} {}",
                        record.name,
                        record.spec.mode.to_string(),
                        started,
                        record.status.backup_size_readable,
                        status
                    );
                }
            },
            "json" => {
                let json = serde_json::to_string_pretty(&records)?;
                println!("{}", json);
            },
            _ => {
                return Err(anyhow!("Unsupported format: {}", format));
            }
        }

        Ok(())
    }
}
