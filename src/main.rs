//! Main entry point for the registry-pull CLI

use clap::Parser;
use registry_pull::cli::{status, Cli, Commands};
use registry_pull::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("registry_pull=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight records and saving progress...");
                shutdown.request_shutdown();
            }
        }
    });

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = registry_pull::metrics::init_metrics(addr) {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Pull(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Status => status::execute_status(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::Monitor(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Clean(ref args) => args.execute(&cli).map_err(|e| anyhow::anyhow!(e)),
        Commands::RetryFailed(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
