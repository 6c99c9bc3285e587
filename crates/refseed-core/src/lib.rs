//! Core types for refseed: configuration, errors, schema definitions and the
//! storage capability the migration runner and seeding engine are written
//! against.

pub mod config;
pub mod error;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::RefseedConfig;
pub use error::{RefseedError, Result};
pub use schema::{
    ColumnDef, DdlOp, ForeignKeyDef, IndexDef, ReferentialAction, SchemaObject, SqlType, TableDef,
};
pub use store::{Row, SchemaStore, StoreError, StoreErrorKind};
