use anyhow::Result;
use clap::Parser;
use console::style;

use refseed::{master_datasets, Database, PgStore, SeedEngine, SeedReport};
use refseed_runtime::seed::{dataset_for, SeedDataset, SeedError};

use super::{connect, print_banner, GlobalArgs};

/// Seed reference data.
#[derive(Parser)]
pub struct SeedCommand {
    /// Table to seed (plant, unit, location).
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub table: Option<String>,

    /// Seed every master table in dependency order.
    #[arg(long)]
    pub all: bool,

    /// Print reports as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SeedCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let datasets = self.datasets()?;

        let config = global.load_config()?;
        let db = connect(&config).await?;
        let result = self.run(&db, &datasets).await;
        db.close().await;

        let reports = result?;
        let failed: usize = reports.iter().map(|r| r.failed.len()).sum();
        if failed > 0 {
            anyhow::bail!("{} seed record(s) failed", failed);
        }
        Ok(())
    }

    fn datasets(&self) -> Result<Vec<SeedDataset>> {
        if self.all {
            return Ok(master_datasets());
        }
        let table = self.table.as_deref().unwrap_or_default();
        let dataset =
            dataset_for(table).ok_or_else(|| SeedError::UnknownDataset(table.to_string()))?;
        Ok(vec![dataset])
    }

    async fn run(&self, db: &Database, datasets: &[SeedDataset]) -> Result<Vec<SeedReport>> {
        let store = PgStore::acquire(db).await?;

        match SeedEngine::new(&store).seed_all(datasets).await {
            Ok(reports) => {
                self.emit(&reports)?;
                Ok(reports)
            }
            Err(e) => {
                self.emit(&e.reports())?;
                Err(e.into())
            }
        }
    }

    fn emit(&self, reports: &[SeedReport]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(reports)?);
        } else {
            print_banner("Seed");
            for report in reports {
                print_report(report);
            }
            println!();
        }
        Ok(())
    }
}

pub(super) fn print_report(report: &SeedReport) {
    let marker = if report.is_clean() {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!(
        "  {} {}: {} created, {} skipped, {} failed",
        marker,
        style(&report.table).cyan(),
        report.created,
        report.skipped,
        report.failed.len()
    );
    for failure in &report.failed {
        println!(
            "      {} {}: {}",
            style("→").dim(),
            failure.key.as_deref().unwrap_or("<no key>"),
            style(&failure.error).red()
        );
    }
}
