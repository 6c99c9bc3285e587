mod builtin;
mod error;
mod plan;
mod runner;
mod unit;

pub use builtin::{
    location_table, master_migrations, master_units, plant_table, unit_table,
    CREATE_LOCATION_VERSION, CREATE_PLANT_VERSION, CREATE_UNIT_VERSION,
};
pub use error::MigrationError;
pub use plan::MigrationPlan;
pub use runner::{AppliedReport, MigrationRunner, UnitOutcome, UnitReport, UnitStatus};
pub use unit::{MigrationUnit, SchemaChange};
