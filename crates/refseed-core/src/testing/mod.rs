//! Test utilities.
//!
//! [`MemoryStore`] backs fast unit tests of the migration runner and the
//! seeding engine. [`TestDatabase`] provides real PostgreSQL databases for
//! integration tests when `TEST_DATABASE_URL` is set.

pub mod db;
pub mod memory;

pub use db::{IsolatedTestDb, TestDatabase};
pub use memory::MemoryStore;

use crate::store::Row;

/// Build a [`Row`] from column/value pairs.
pub fn row(pairs: &[(&str, Option<&str>)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.map(str::to_string)))
        .collect()
}
