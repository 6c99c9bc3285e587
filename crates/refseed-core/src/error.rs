use thiserror::Error;

use crate::store::StoreError;

/// Core error type for refseed operations.
#[derive(Error, Debug)]
pub enum RefseedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias using RefseedError.
pub type Result<T> = std::result::Result<T, RefseedError>;
