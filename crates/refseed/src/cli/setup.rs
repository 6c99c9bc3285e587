use anyhow::Result;
use clap::Parser;
use console::style;

use refseed::{bootstrap, BootstrapReport, SeedingInterrupted};

use super::seed::print_report;
use super::{print_banner, GlobalArgs};

/// Apply migrations, then seed every master table.
#[derive(Parser)]
pub struct SetupCommand {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SetupCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;

        let report = match bootstrap(&config).await {
            Ok(report) => report,
            Err(e) => {
                if let Some(interrupted) = e.downcast_ref::<SeedingInterrupted>() {
                    self.emit(&interrupted.report)?;
                }
                return Err(e);
            }
        };
        self.emit(&report)?;

        if !report.is_clean() {
            anyhow::bail!("Setup finished with failed seed records");
        }
        Ok(())
    }

    fn emit(&self, report: &BootstrapReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        print_banner("Setup");
        println!(
            "  {} Migrations: {} applied, {} completed, {} already present",
            style("✓").green(),
            report.migrations.applied(),
            report.migrations.completed(),
            report.migrations.skipped()
        );
        for seed in &report.seeds {
            print_report(seed);
        }
        println!();
        Ok(())
    }
}
