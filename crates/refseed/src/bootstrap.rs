use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use refseed_core::store::SchemaStore;
use refseed_core::RefseedConfig;
use refseed_runtime::{
    master_datasets, master_migrations, AppliedReport, Database, MigrationRunner, PgStore,
    SeedAllError, SeedEngine, SeedReport,
};

/// Outcome of a full startup pass.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub migrations: AppliedReport,
    pub seeds: Vec<SeedReport>,
}

impl BootstrapReport {
    /// True when every seed record landed or was already present.
    pub fn is_clean(&self) -> bool {
        self.seeds.iter().all(SeedReport::is_clean)
    }
}

/// Seeding stopped early. `report` holds what was done before that.
#[derive(Error, Debug)]
#[error("Bootstrap stopped while seeding")]
pub struct SeedingInterrupted {
    pub report: BootstrapReport,
    #[source]
    pub source: SeedAllError,
}

/// Apply pending migrations, then seed every master table.
///
/// Opens its own pool and closes it before returning.
pub async fn bootstrap(config: &RefseedConfig) -> Result<BootstrapReport> {
    let db = Database::from_config(&config.database).await?;
    let result = bootstrap_on(&db).await;
    db.close().await;
    result
}

async fn bootstrap_on(db: &Database) -> Result<BootstrapReport> {
    let store = PgStore::acquire(db).await?;
    bootstrap_with_store(&store).await
}

/// Same as [`bootstrap`] against an already open store.
pub async fn bootstrap_with_store<S: SchemaStore + ?Sized>(store: &S) -> Result<BootstrapReport> {
    let plan = master_migrations()?;
    let migrations = MigrationRunner::new(store).apply_all(&plan).await?;

    let seeds = match SeedEngine::new(store).seed_all(&master_datasets()).await {
        Ok(seeds) => seeds,
        Err(source) => {
            let report = BootstrapReport {
                migrations,
                seeds: source.reports(),
            };
            return Err(SeedingInterrupted { report, source }.into());
        }
    };

    info!(
        applied = migrations.applied(),
        seeded = seeds.iter().map(|r| r.created).sum::<usize>(),
        "Bootstrap complete"
    );

    Ok(BootstrapReport { migrations, seeds })
}
