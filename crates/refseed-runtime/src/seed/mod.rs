//! Reference-data seeding.

mod datasets;
mod engine;
mod record;

pub use datasets::{dataset_for, locations, master_datasets, plants, units};
pub use engine::{SeedAllError, SeedEngine, SeedError};
pub use record::{FailedRecord, SeedDataset, SeedRecord, SeedReport, TableHandle};
