use refseed_core::store::StoreError;
use thiserror::Error;

/// Failures of the migration runner and plan validation.
///
/// A target object that already exists is not an error; the unit is reported
/// as skipped instead.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: u64,
        first: String,
        second: String,
    },

    #[error(
        "Migration {version}_{name} depends on table '{table}', which is created later by {provider}"
    )]
    DependencyOrder {
        version: u64,
        name: String,
        table: String,
        provider: String,
    },

    #[error("Migration {version}_{name} depends on table '{table}', which no migration creates")]
    UnresolvedDependency {
        version: u64,
        name: String,
        table: String,
    },

    #[error("Migration {version}_{name} is invalid: {reason}")]
    InvalidUnit {
        version: u64,
        name: String,
        reason: String,
    },

    #[error("Migration {version}_{name} failed: {source}")]
    Failed {
        version: u64,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "Migration {version}_{name} partially applied: table '{table}' exists but {object} failed: {source}"
    )]
    PartiallyApplied {
        version: u64,
        name: String,
        table: String,
        object: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to acquire migration lock: {0}")]
    Lock(#[source] StoreError),
}
