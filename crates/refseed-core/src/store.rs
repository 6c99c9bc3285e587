//! Storage capability surface.
//!
//! The migration runner and seeding engine only ever talk to storage through
//! [`SchemaStore`]. The runtime crate implements it for PostgreSQL; the
//! `testing` feature provides an in-memory implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{DdlOp, SchemaObject};

/// A row keyed by column name. All reference-table values are text.
pub type Row = BTreeMap<String, Option<String>>;

/// Classification of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// Storage is unreachable. Nothing further can succeed in this run.
    Connection,
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    ValueTooLong,
    DuplicateObject,
    UndefinedObject,
    Other,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Connection => "connection",
            StoreErrorKind::UniqueViolation => "unique_violation",
            StoreErrorKind::ForeignKeyViolation => "foreign_key_violation",
            StoreErrorKind::NotNullViolation => "not_null_violation",
            StoreErrorKind::ValueTooLong => "value_too_long",
            StoreErrorKind::DuplicateObject => "duplicate_object",
            StoreErrorKind::UndefinedObject => "undefined_object",
            StoreErrorKind::Other => "other",
        }
    }
}

/// Error reported by a [`SchemaStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}: {message}", .kind.as_str())]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Connection, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }

    /// True when storage itself is unavailable, as opposed to a single
    /// statement being rejected.
    pub fn is_infrastructure(&self) -> bool {
        self.kind == StoreErrorKind::Connection
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let kind = match &e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreErrorKind::Connection,
            sqlx::Error::Database(db) => db
                .code()
                .map(|code| kind_for_sqlstate(&code))
                .unwrap_or(StoreErrorKind::Other),
            _ => StoreErrorKind::Other,
        };
        StoreError::new(kind, e.to_string())
    }
}

/// Map a PostgreSQL SQLSTATE code to an error kind.
pub fn kind_for_sqlstate(code: &str) -> StoreErrorKind {
    match code {
        "23505" => StoreErrorKind::UniqueViolation,
        "23503" => StoreErrorKind::ForeignKeyViolation,
        "23502" => StoreErrorKind::NotNullViolation,
        "22001" => StoreErrorKind::ValueTooLong,
        "42P07" | "42710" => StoreErrorKind::DuplicateObject,
        "42P01" | "42704" => StoreErrorKind::UndefinedObject,
        c if c.starts_with("08") => StoreErrorKind::Connection,
        _ => StoreErrorKind::Other,
    }
}

/// Operations the migration runner and seeding engine need from storage.
///
/// Calls are awaited one at a time; implementations need not support
/// overlapping calls from the same run.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Whether the named table, index or constraint exists.
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StoreError>;

    /// Execute a DDL statement.
    async fn execute_ddl(&self, op: &DdlOp) -> Result<(), StoreError>;

    /// Fetch the row whose `key_column` equals `key`.
    async fn find_row(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, StoreError>;

    /// Insert a row.
    async fn insert_row(&self, table: &str, row: &Row) -> Result<(), StoreError>;

    /// Delete the row whose `key_column` equals `key`, returning the number
    /// of rows removed.
    async fn delete_row(&self, table: &str, key_column: &str, key: &str)
        -> Result<u64, StoreError>;

    /// Serialize schema changes against other runners. No-op by default.
    async fn acquire_migration_lock(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn release_migration_lock(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
