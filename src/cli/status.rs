//! Status, monitor and clean commands

use super::pull::confirm;
use super::{Cli, CliError};
use crate::monitor::ProgressMonitor;
use crate::progress::JobLock;
use crate::pull::config::DEFAULT_MONITOR_INTERVAL;
use crate::shutdown::SharedShutdown;
use clap::Parser;
use futures::StreamExt;
use std::time::Duration;
use tracing::info;

/// Print every chunk's progress once
pub fn execute_status(cli: &Cli) -> Result<(), CliError> {
    let snapshot = ProgressMonitor::new(cli.progress_store()).snapshot()?;
    println!("{}", snapshot.render());
    Ok(())
}

/// Arguments of the monitor command
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Seconds between refreshes
    #[arg(long, default_value_t = DEFAULT_MONITOR_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
}

impl MonitorArgs {
    /// Watch progress until every chunk is terminal or shutdown is requested
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let monitor = ProgressMonitor::new(cli.progress_store());
        let mut snapshots = Box::pin(monitor.poll(Duration::from_secs(self.interval)));

        loop {
            let next = tokio::select! {
                next = snapshots.next() => next,
                _ = shutdown.wait_for_shutdown() => {
                    info!("Monitor stopped");
                    return Ok(());
                }
            };
            let Some(snapshot) = next else {
                return Ok(());
            };

            let snapshot = snapshot?;
            println!("{}\n", snapshot.render());
            if snapshot.all_terminal() {
                println!("All chunks finished.");
                return Ok(());
            }
        }
    }
}

/// Arguments of the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Delete even while some chunks are unfinished
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Do not ask for confirmation
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

impl CleanArgs {
    /// Delete every chunk progress file
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let store = cli.progress_store();
        let snapshot = ProgressMonitor::new(store.clone()).snapshot()?;
        if snapshot.chunks.is_empty() {
            println!("No progress files in {}", store.dir().display());
            return Ok(());
        }

        let unfinished = snapshot.chunks.len() - snapshot.count_terminal();
        if unfinished > 0 && !self.force {
            return Err(CliError::InvalidArgument(format!(
                "{unfinished} chunks are not finished; rerun the pull to complete them or pass --force"
            )));
        }

        let prompt = format!(
            "Delete {} progress files in {}?",
            snapshot.chunks.len(),
            store.dir().display()
        );
        if !self.yes && !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }

        let mut job_lock = JobLock::open(store.dir())?;
        let _guard = job_lock.try_acquire()?;
        let removed = store.remove_all()?;
        println!("Removed {removed} progress files");
        Ok(())
    }
}
