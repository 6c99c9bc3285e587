//! refseed - schema migrations and reference-data seeding for the master
//! tables (plant, unit, location).
//!
//! The CLI lives in `main.rs`; this library exposes the startup hook so a
//! service can converge its schema and master data before serving.

mod bootstrap;
mod logging;

pub use bootstrap::{bootstrap, bootstrap_with_store, BootstrapReport, SeedingInterrupted};
pub use logging::init_tracing;

pub use refseed_core::{RefseedConfig, RefseedError};
pub use refseed_runtime::{
    master_datasets, master_migrations, AppliedReport, Database, MigrationRunner, PgStore,
    SeedEngine, SeedReport,
};
