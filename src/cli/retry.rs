//! Retry-failed command

use super::{Cli, CliError};
use crate::pull::RepullReport;
use crate::shutdown::SharedShutdown;
use crate::StudentNumber;
use clap::Parser;

/// Arguments of the retry-failed command
#[derive(Parser, Debug)]
pub struct RetryFailedArgs {
    /// Only pull personal and academic details, skip the program list
    #[arg(long, default_value_t = false)]
    pub info: bool,
}

impl RetryFailedArgs {
    /// Re-pull the union of failed identifiers across all progress files
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let orchestrator = cli.build_orchestrator(self.info, shutdown)?;
        let ids: Vec<StudentNumber> = orchestrator.failed_identifiers()?.into_iter().collect();
        if ids.is_empty() {
            println!("No failed identifiers recorded in {}", cli.progress_dir.display());
            return Ok(());
        }

        println!("Re-pulling {} failed identifiers", ids.len());
        let report = orchestrator.repull(&ids).await?;
        println!("{}", render_report(&report));
        Ok(())
    }
}

fn render_report(report: &RepullReport) -> String {
    let mut lines = vec![format!(
        "Recovered: {}, still failing: {}",
        report.recovered.len(),
        report.still_failed.len()
    )];
    if !report.still_failed.is_empty() {
        let ids: Vec<String> = report.still_failed.iter().map(|id| id.to_string()).collect();
        lines.push(format!("Still failing: {}", ids.join(", ")));
    }
    if report.cancelled {
        lines.push("Interrupted by shutdown before every identifier was tried".to_string());
    }
    lines.join("\n")
}
