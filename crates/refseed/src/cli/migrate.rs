use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use serde::Serialize;

use refseed::{master_migrations, AppliedReport, Database, MigrationRunner, PgStore};
use refseed_runtime::migrations::{MigrationPlan, UnitOutcome, UnitStatus};

use super::{connect, print_banner, GlobalArgs};

/// Manage schema migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Print the result as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Apply every pending migration in order.
    Up,

    /// Revert the last N applied migrations.
    Down {
        /// Number of migrations to revert.
        #[arg(default_value = "1")]
        count: usize,
    },

    /// Show which migrations are applied.
    Status,

    /// List available migrations without connecting.
    List,
}

/// Result of `migrate down`.
#[derive(Debug, Serialize)]
struct RevertReport {
    reverted: Vec<String>,
}

impl MigrateCommand {
    pub async fn execute(self, global: &GlobalArgs) -> Result<()> {
        let plan = master_migrations()?;

        if let MigrateAction::List = self.action {
            return self.list(&plan);
        }

        let config = global.load_config()?;
        let db = connect(&config).await?;
        let result = self.run(&db, &plan).await;
        db.close().await;
        result
    }

    fn list(&self, plan: &MigrationPlan) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(plan.units())?);
            return Ok(());
        }

        print_banner("Available Migrations");
        for unit in plan.units() {
            println!(
                "    {} {} {}",
                style(unit.version).dim(),
                style(&unit.name).cyan(),
                style(format!("({})", unit.target())).dim()
            );
        }
        println!();
        Ok(())
    }

    async fn run(&self, db: &Database, plan: &MigrationPlan) -> Result<()> {
        let store = PgStore::acquire(db).await?;
        let runner = MigrationRunner::new(&store);

        match self.action {
            MigrateAction::Up => {
                let report = runner.apply_all(plan).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_applied(&report);
                }
            }

            MigrateAction::Down { count } => {
                let mut reverted = Vec::new();
                for _ in 0..count {
                    match runner.revert_last(plan).await? {
                        Some(unit) => reverted.push(unit.id()),
                        None => break,
                    }
                }
                let report = RevertReport { reverted };
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_reverted(&report);
                }
            }

            MigrateAction::Status => {
                let statuses = runner.status(plan).await?;
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&statuses)?);
                } else {
                    print_status(&statuses);
                }
            }

            MigrateAction::List => {}
        }

        Ok(())
    }
}

fn print_applied(report: &AppliedReport) {
    print_banner("Migrations");
    for unit in &report.units {
        match unit.outcome {
            UnitOutcome::Applied => println!(
                "  {} Applied: {}_{}",
                style("✓").green(),
                unit.version,
                unit.name
            ),
            UnitOutcome::Completed => println!(
                "  {} Completed missing objects: {}_{}",
                style("!").yellow(),
                unit.version,
                unit.name
            ),
            UnitOutcome::Skipped => println!(
                "    {} {}_{} already present",
                style("-").dim(),
                unit.version,
                unit.name
            ),
        }
    }

    println!();
    println!(
        "  {} {} applied, {} completed, {} already present",
        style("ℹ").blue(),
        report.applied(),
        report.completed(),
        report.skipped()
    );
    println!();
}

fn print_reverted(report: &RevertReport) {
    print_banner("Migrations");

    if report.reverted.is_empty() {
        println!("  {} No migrations to revert", style("ℹ").blue());
    } else {
        for id in &report.reverted {
            println!("  {} Reverted: {}", style("✓").green(), id);
        }
        println!();
        println!(
            "  {} Reverted {} migration(s)",
            style("✓").green(),
            report.reverted.len()
        );
    }
    println!();
}

fn print_status(statuses: &[UnitStatus]) {
    print_banner("Migration Status");

    for status in statuses {
        let marker = if status.applied {
            style("✓").green().to_string()
        } else {
            style("○").yellow().to_string()
        };
        println!(
            "    {} {}_{} {}",
            marker,
            status.version,
            style(&status.name).cyan(),
            style(format!("({})", status.target)).dim()
        );
        // Target present but objects missing: incomplete rather than pending.
        if status.missing.first() == Some(&status.target) {
            continue;
        }
        for object in &status.missing {
            println!("        {} missing {}", style("→").dim(), style(object).red());
        }
    }

    let applied = statuses.iter().filter(|s| s.applied).count();
    println!();
    println!(
        "  {} {} applied, {} pending",
        style("ℹ").blue(),
        applied,
        statuses.len() - applied
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_report_json() {
        let report = RevertReport {
            reverted: vec!["20240101000003_create_location".into()],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["reverted"][0], "20240101000003_create_location");
    }
}
