//! Pull command implementation

use super::{Cli, CliError};
use crate::monitor::ProgressMonitor;
use crate::pull::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_WORKERS, MAX_WORKERS_LIMIT};
use crate::pull::PullOptions;
use crate::range::Range;
use crate::shutdown::SharedShutdown;
use crate::StudentNumber;
use clap::Parser;
use dialoguer::Confirm;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// How often the progress bar re-reads the progress files
const BAR_REFRESH: Duration = Duration::from_secs(1);

/// Parse and validate the worker count
fn parse_max_workers(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("max workers must be at least 1".to_string());
    }
    if value > MAX_WORKERS_LIMIT {
        return Err(format!(
            "max workers {value} exceeds maximum of {MAX_WORKERS_LIMIT}"
        ));
    }
    Ok(value)
}

/// Arguments of the pull command
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// First student number to pull
    #[arg(long)]
    pub start: StudentNumber,

    /// Student number to stop at (exclusive); below --start pulls downwards
    #[arg(long)]
    pub end: StudentNumber,

    /// Student numbers per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: u64,

    /// Chunks pulled concurrently (max: 64)
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS, value_parser = parse_max_workers)]
    pub max_workers: usize,

    /// Only pull personal and academic details, skip the program list
    #[arg(long, default_value_t = false)]
    pub info: bool,

    /// Discard all chunk progress and start the range from scratch
    #[arg(long, default_value_t = false)]
    pub reset: bool,

    /// Do not ask for confirmation
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

impl PullArgs {
    /// Requested range
    pub fn range(&self) -> Result<Range, CliError> {
        let range = Range::new(self.start, self.end);
        if range.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "range {range} contains no student numbers"
            )));
        }
        Ok(range)
    }

    /// Pull options from the flags
    pub fn options(&self) -> PullOptions {
        PullOptions::new(self.chunk_size, self.max_workers).with_reset(self.reset)
    }

    /// Execute the pull
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let range = self.range()?;
        let options = self.options();
        options.validate()?;
        let chunks = range.split(options.chunk_size)?;

        println!(
            "Pulling {} student numbers ({range}) in {} chunks of up to {} with {} workers",
            range.len(),
            chunks.len(),
            options.chunk_size,
            options.max_workers
        );
        if self.info {
            println!("Program lists will not be fetched (--info)");
        }
        if self.reset {
            println!("All chunk progress in {} will be discarded", cli.progress_dir.display());
        }

        if !self.yes && !confirm("Proceed with the pull?")? {
            println!("Aborted.");
            return Ok(());
        }

        let orchestrator = cli.build_orchestrator(self.info, shutdown)?;

        let bar = create_progress_bar(range.len());
        let watcher = tokio::spawn({
            let bar = bar.clone();
            let monitor = ProgressMonitor::new(cli.progress_store());
            async move {
                let mut snapshots = Box::pin(monitor.poll(BAR_REFRESH));
                while let Some(snapshot) = snapshots.next().await {
                    if let Ok(snapshot) = snapshot {
                        bar.set_position(snapshot.processed());
                        bar.set_message(format!("{} failed", snapshot.failed()));
                    }
                }
            }
        });

        info!(range = %range, "Starting pull");
        let result = orchestrator.run(range, &options).await;
        watcher.abort();
        bar.finish_and_clear();

        let summary = result?;
        println!("\n{}", summary.render());
        if !summary.failed_ids.is_empty() {
            println!("Run `registry-pull retry-failed` to pull the failed identifiers again");
        }
        Ok(())
    }
}

/// Ask a yes/no question on stderr
pub(crate) fn confirm(prompt: &str) -> Result<bool, CliError> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| CliError::Prompt(e.to_string()))
}

/// Create progress bar with style
fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb
}
