mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{clean::CleanCommand, list::ListCommand, next::NextCommand};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "chainsweep",
    about = "Clean up database backups",
    long_about = "Chainsweep deletes the artifacts of a backup, records the outcome on the backup record, \
                  and keeps the sizes of incremental volume-snapshot chains up to date"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "CHAINSWEEP_STORE", help = "Backup record store directory")]
    store: Option<PathBuf>,

    #[arg(short, long, global = true, env = "CHAINSWEEP_NAMESPACE", help = "Namespace of the backups")]
    namespace: Option<String>,

    #[arg(long, global = true, env = "CHAINSWEEP_CONFIG", help = "Config file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Delete a backup's data and record the outcome")]
    Clean(CleanCommand),

    #[command(about = "List backups in chain order")]
    List(ListCommand),

    #[command(about = "Show the next volume-snapshot backup after a backup")]
    Next(NextCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    info!("Starting chainsweep");

    match cli.command {
        Commands::Clean(ref cmd) => cmd.run(&cli).await,
        Commands::List(ref cmd) => cmd.run(&cli).await,
        Commands::Next(ref cmd) => cmd.run(&cli).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "chainsweep_cli={level},chainsweep_core={level},chainsweep_backends={level}"
        ))
    });

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");
}

/// Returns a token cancelled on SIGINT or SIGTERM.
pub(crate) fn cancel_on_termination(operation: String) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!(operation = %operation, "Received SIGINT, cancelling"),
            _ = terminate => info!(operation = %operation, "Received SIGTERM, cancelling"),
            _ = token.cancelled() => return,
        }

        token.cancel();
    });

    cancel
}
