//! Idempotent reference-data loader.
//!
//! Each record is looked up by natural key: present rows are skipped,
//! absent rows are inserted. An insert that fails is recorded against its
//! record and the loop moves on. Only loss of storage ends the run early.

use thiserror::Error;
use tracing::{debug, info, warn};

use refseed_core::schema::SchemaObject;
use refseed_core::store::{SchemaStore, StoreError, StoreErrorKind};

use super::record::{FailedRecord, SeedDataset, SeedRecord, SeedReport, TableHandle};

/// Errors that stop a seed run. Per-record failures are not errors; they are
/// collected in [`SeedReport::failed`].
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Table '{table}' does not exist; run migrations before seeding")]
    TableMissing { table: String },

    #[error("Storage unavailable while seeding '{table}': {source}")]
    Infrastructure {
        table: String,
        #[source]
        source: StoreError,
        /// Records handled before storage was lost.
        partial: Box<SeedReport>,
    },

    #[error("No seed dataset for table '{0}'")]
    UnknownDataset(String),
}

impl SeedError {
    /// Best-effort report of what was done before the run stopped.
    pub fn partial(&self) -> Option<&SeedReport> {
        match self {
            SeedError::Infrastructure { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// A multi-table run that stopped early. Tables seeded before the failure
/// keep their reports.
#[derive(Error, Debug)]
#[error("Seeding stopped after {} completed table(s)", completed.len())]
pub struct SeedAllError {
    pub completed: Vec<SeedReport>,
    #[source]
    pub error: SeedError,
}

impl SeedAllError {
    /// Every report produced before the run stopped, including the partial
    /// report of the interrupted table.
    pub fn reports(&self) -> Vec<SeedReport> {
        let mut reports = self.completed.clone();
        reports.extend(self.error.partial().cloned());
        reports
    }
}

/// Terminal state of one record.
enum RecordOutcome {
    Created,
    Skipped,
    Failed(StoreError),
}

/// Seeds reference tables through a [`SchemaStore`].
pub struct SeedEngine<'a, S: SchemaStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: SchemaStore + ?Sized> SeedEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Insert every record whose natural key is absent from `handle.table`.
    pub async fn seed(
        &self,
        records: &[SeedRecord],
        handle: &TableHandle,
    ) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::new(&handle.table);

        let exists = self
            .store
            .object_exists(&SchemaObject::table(&handle.table))
            .await
            .map_err(|source| infrastructure(handle, source, &report))?;
        if !exists {
            return Err(SeedError::TableMissing {
                table: handle.table.clone(),
            });
        }

        for record in records {
            match self.seed_record(record, handle).await {
                Ok(RecordOutcome::Created) => report.created += 1,
                Ok(RecordOutcome::Skipped) => report.skipped += 1,
                Ok(RecordOutcome::Failed(error)) => {
                    warn!(
                        table = %handle.table,
                        key = record.get(&handle.key_column).unwrap_or("<none>"),
                        "Seed record failed: {}",
                        error
                    );
                    report.failed.push(FailedRecord {
                        key: record.get(&handle.key_column).map(str::to_string),
                        record: record.clone(),
                        error,
                    });
                }
                Err(source) => return Err(infrastructure(handle, source, &report)),
            }
        }

        info!(
            table = %handle.table,
            created = report.created,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Seeding complete"
        );
        Ok(report)
    }

    /// Returns `Err` only for infrastructure failures.
    async fn seed_record(
        &self,
        record: &SeedRecord,
        handle: &TableHandle,
    ) -> Result<RecordOutcome, StoreError> {
        let Some(key) = record.get(&handle.key_column) else {
            return Ok(RecordOutcome::Failed(StoreError::new(
                StoreErrorKind::NotNullViolation,
                format!("record has no value for natural key '{}'", handle.key_column),
            )));
        };

        match self.store.find_row(&handle.table, &handle.key_column, key).await {
            Ok(Some(_)) => {
                debug!(table = %handle.table, key, "Row exists, skipping");
                return Ok(RecordOutcome::Skipped);
            }
            Ok(None) => {}
            Err(e) if e.is_infrastructure() => return Err(e),
            Err(e) => return Ok(RecordOutcome::Failed(e)),
        }

        match self.store.insert_row(&handle.table, record.values()).await {
            Ok(()) => {
                debug!(table = %handle.table, key, "Row created");
                Ok(RecordOutcome::Created)
            }
            Err(e) if e.is_infrastructure() => Err(e),
            Err(e) => Ok(RecordOutcome::Failed(e)),
        }
    }

    /// Seed a dataset.
    pub async fn seed_dataset(&self, dataset: &SeedDataset) -> Result<SeedReport, SeedError> {
        self.seed(&dataset.records, &dataset.handle).await
    }

    /// Seed datasets in the given order. Stops only on a top-level error.
    pub async fn seed_all(
        &self,
        datasets: &[SeedDataset],
    ) -> Result<Vec<SeedReport>, SeedAllError> {
        let mut reports = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            match self.seed_dataset(dataset).await {
                Ok(report) => reports.push(report),
                Err(error) => {
                    return Err(SeedAllError {
                        completed: reports,
                        error,
                    })
                }
            }
        }
        Ok(reports)
    }
}

fn infrastructure(handle: &TableHandle, source: StoreError, report: &SeedReport) -> SeedError {
    SeedError::Infrastructure {
        table: handle.table.clone(),
        source,
        partial: Box::new(report.clone()),
    }
}
