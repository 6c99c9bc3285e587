use serde::Serialize;

use refseed_core::store::{Row, StoreError};

/// A table plus the natural-key column used to recognise existing rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableHandle {
    pub table: String,
    pub key_column: String,
}

impl TableHandle {
    pub fn new(table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
        }
    }
}

/// A canonical row that should exist in a reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SeedRecord {
    values: Row,
}

impl SeedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value.
    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.values.insert(column.to_string(), Some(value.to_string()));
        self
    }

    /// Set a column to NULL.
    pub fn with_null(mut self, column: &str) -> Self {
        self.values.insert(column.to_string(), None);
        self
    }

    /// Non-null value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    pub fn values(&self) -> &Row {
        &self.values
    }
}

impl From<Row> for SeedRecord {
    fn from(values: Row) -> Self {
        Self { values }
    }
}

/// A fixed list of records for one table.
#[derive(Debug, Clone, Serialize)]
pub struct SeedDataset {
    pub handle: TableHandle,
    pub records: Vec<SeedRecord>,
    /// Tables whose datasets must be seeded first.
    pub depends_on: Vec<String>,
}

impl SeedDataset {
    pub fn new(handle: TableHandle, records: Vec<SeedRecord>) -> Self {
        Self {
            handle,
            records,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, table: &str) -> Self {
        self.depends_on.push(table.to_string());
        self
    }
}

/// A record whose insert (or lookup) failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    /// Natural key, if the record had one.
    pub key: Option<String>,
    pub record: SeedRecord,
    pub error: StoreError,
}

/// Outcome of seeding one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub table: String,
    pub created: usize,
    pub skipped: usize,
    pub failed: Vec<FailedRecord>,
}

impl SeedReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            created: 0,
            skipped: 0,
            failed: Vec::new(),
        }
    }

    /// Records processed so far.
    pub fn processed(&self) -> usize {
        self.created + self.skipped + self.failed.len()
    }

    /// True when no record failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
