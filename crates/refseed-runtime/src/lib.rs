pub mod db;
pub mod migrations;
pub mod seed;

pub use db::{Database, PgStore};
pub use migrations::{
    master_migrations, AppliedReport, MigrationError, MigrationPlan, MigrationRunner,
    MigrationUnit, SchemaChange, UnitOutcome, UnitStatus,
};
pub use seed::{
    master_datasets, SeedAllError, SeedDataset, SeedEngine, SeedError, SeedRecord, SeedReport, TableHandle,
};
