mod migrate;
mod seed;
mod setup;

pub use migrate::MigrateCommand;
pub use seed::SeedCommand;
pub use setup::SetupCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;

use refseed::{init_tracing, Database, RefseedConfig};

/// refseed - master-table migrations and reference data
#[derive(Parser)]
#[command(name = "refseed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Configuration file path.
    #[arg(short, long, default_value = "refseed.toml", global = true)]
    pub config: String,

    /// Database URL (overrides the config file).
    #[arg(long, global = true)]
    pub database_url: Option<String>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage schema migrations.
    Migrate(MigrateCommand),

    /// Seed reference data.
    Seed(SeedCommand),

    /// Apply migrations, then seed every master table.
    Setup(SetupCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Migrate(cmd) => cmd.execute(&self.global).await,
            Commands::Seed(cmd) => cmd.execute(&self.global).await,
            Commands::Setup(cmd) => cmd.execute(&self.global).await,
        }
    }
}

impl GlobalArgs {
    /// Load configuration and install logging.
    ///
    /// Without a config file, `--database-url` or `DATABASE_URL` is enough.
    pub fn load_config(&self) -> Result<RefseedConfig> {
        dotenvy::dotenv().ok();

        let config_path = Path::new(&self.config);
        let mut config = if config_path.exists() {
            RefseedConfig::from_file(config_path)?
        } else if let Some(url) = self
            .database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
        {
            RefseedConfig::default_with_database_url(&url)
        } else {
            anyhow::bail!(
                "Configuration file not found: {}\nCreate it or pass --database-url.",
                self.config
            );
        };

        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }

        init_tracing(&config.logging);
        Ok(config)
    }
}

/// Connect using the loaded configuration.
async fn connect(config: &RefseedConfig) -> Result<Database> {
    Ok(Database::from_config(&config.database).await?)
}

fn print_banner(title: &str) {
    println!();
    println!(
        "  {}  {} {}",
        style("⚒️").bold(),
        style("refseed").bold().cyan(),
        title
    );
    println!();
}
