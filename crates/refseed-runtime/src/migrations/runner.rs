//! Migration runner.
//!
//! Applies a [`MigrationPlan`] in version order. Each unit first asks storage
//! which of its declared objects exist. A unit with all of them is skipped
//! without side effects; one whose table exists but lacks an index or
//! foreign key gets only the missing objects. Any real DDL failure stops the
//! run.

use serde::Serialize;
use tracing::{debug, info, warn};

use refseed_core::schema::{DdlOp, SchemaObject};
use refseed_core::store::{SchemaStore, StoreError};

use super::error::MigrationError;
use super::plan::MigrationPlan;
use super::unit::MigrationUnit;

/// What happened to a unit during `apply_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Applied,
    /// The target existed; missing indexes or constraints were created.
    Completed,
    Skipped,
}

/// Per-unit result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub version: u64,
    pub name: String,
    pub outcome: UnitOutcome,
}

/// Summary of an `apply_all` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedReport {
    pub units: Vec<UnitReport>,
}

impl AppliedReport {
    pub fn applied(&self) -> usize {
        self.count(UnitOutcome::Applied)
    }

    pub fn completed(&self) -> usize {
        self.count(UnitOutcome::Completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(UnitOutcome::Skipped)
    }

    fn count(&self, outcome: UnitOutcome) -> usize {
        self.units.iter().filter(|u| u.outcome == outcome).count()
    }
}

/// Whether every object a unit declares currently exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub version: u64,
    pub name: String,
    pub target: String,
    pub applied: bool,
    /// Declared objects not present in storage.
    pub missing: Vec<String>,
}

/// Runs migration units against a [`SchemaStore`].
pub struct MigrationRunner<'a, S: SchemaStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: SchemaStore + ?Sized> MigrationRunner<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Apply every unit of the plan in order.
    ///
    /// The migration lock is held for the whole run and released on every
    /// exit path.
    pub async fn apply_all(&self, plan: &MigrationPlan) -> Result<AppliedReport, MigrationError> {
        self.store
            .acquire_migration_lock()
            .await
            .map_err(MigrationError::Lock)?;

        let result = self.apply_units(plan).await;

        if let Err(e) = self.store.release_migration_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn apply_units(&self, plan: &MigrationPlan) -> Result<AppliedReport, MigrationError> {
        let mut report = AppliedReport::default();

        for unit in plan.units() {
            let outcome = self.apply_unit(unit).await?;
            report.units.push(UnitReport {
                version: unit.version,
                name: unit.name.clone(),
                outcome,
            });
        }

        info!(
            applied = report.applied(),
            completed = report.completed(),
            skipped = report.skipped(),
            "Migrations complete"
        );
        Ok(report)
    }

    async fn apply_unit(&self, unit: &MigrationUnit) -> Result<UnitOutcome, MigrationError> {
        let target = unit.target();
        let missing = self.missing_steps(unit).await?;

        let Some((first, _)) = missing.first() else {
            debug!(unit = %unit, "Skipping migration, {} already exists", target);
            return Ok(UnitOutcome::Skipped);
        };

        let outcome = if *first == target {
            info!("Applying migration: {}", unit);
            UnitOutcome::Applied
        } else {
            warn!(
                unit = %unit,
                missing = missing.len(),
                "{} exists but the migration is incomplete, creating missing objects",
                target
            );
            UnitOutcome::Completed
        };

        for (object, op) in &missing {
            if let Err(source) = self.store.execute_ddl(op).await {
                if *object == target {
                    return Err(failed(unit, source));
                }
                // The table exists at this point, so the unit is left partial.
                return Err(MigrationError::PartiallyApplied {
                    version: unit.version,
                    name: unit.name.clone(),
                    table: unit.creates_table().unwrap_or_default().to_string(),
                    object: object.to_string(),
                    source,
                });
            }
        }

        info!("Migration applied: {}", unit);
        Ok(outcome)
    }

    /// Declared objects of `unit` that storage lacks, in creation order.
    async fn missing_steps(
        &self,
        unit: &MigrationUnit,
    ) -> Result<Vec<(SchemaObject, DdlOp)>, MigrationError> {
        let mut missing = Vec::new();
        for (object, op) in unit.steps() {
            let exists = self
                .store
                .object_exists(&object)
                .await
                .map_err(|source| failed(unit, source))?;
            if !exists {
                missing.push((object, op));
            }
        }
        Ok(missing)
    }

    /// Execute a unit's reverse operations unconditionally.
    pub async fn revert(&self, unit: &MigrationUnit) -> Result<(), MigrationError> {
        info!("Reverting migration: {}", unit);

        for op in &unit.reverse {
            self.store
                .execute_ddl(op)
                .await
                .map_err(|source| failed(unit, source))?;
        }

        info!("Migration reverted: {}", unit);
        Ok(())
    }

    /// Revert the highest-version unit whose target exists, complete or not.
    ///
    /// Returns the reverted unit, or `None` if nothing is applied.
    pub async fn revert_last<'p>(
        &self,
        plan: &'p MigrationPlan,
    ) -> Result<Option<&'p MigrationUnit>, MigrationError> {
        self.store
            .acquire_migration_lock()
            .await
            .map_err(MigrationError::Lock)?;

        let result = self.revert_last_inner(plan).await;

        if let Err(e) = self.store.release_migration_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn revert_last_inner<'p>(
        &self,
        plan: &'p MigrationPlan,
    ) -> Result<Option<&'p MigrationUnit>, MigrationError> {
        for unit in plan.units().iter().rev() {
            let exists = self
                .store
                .object_exists(&unit.target())
                .await
                .map_err(|source| failed(unit, source))?;

            if exists {
                self.revert(unit).await?;
                return Ok(Some(unit));
            }
        }

        debug!("No applied migrations to revert");
        Ok(None)
    }

    /// Report which units are applied. A unit counts as applied only when
    /// every object it declares exists.
    pub async fn status(&self, plan: &MigrationPlan) -> Result<Vec<UnitStatus>, MigrationError> {
        let mut statuses = Vec::with_capacity(plan.len());

        for unit in plan.units() {
            let missing: Vec<String> = self
                .missing_steps(unit)
                .await?
                .into_iter()
                .map(|(object, _)| object.to_string())
                .collect();

            statuses.push(UnitStatus {
                version: unit.version,
                name: unit.name.clone(),
                target: unit.target().to_string(),
                applied: missing.is_empty(),
                missing,
            });
        }

        Ok(statuses)
    }
}

fn failed(unit: &MigrationUnit, source: StoreError) -> MigrationError {
    MigrationError::Failed {
        version: unit.version,
        name: unit.name.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::master_migrations;
    use refseed_core::store::StoreErrorKind;
    use refseed_core::testing::MemoryStore;

    #[tokio::test]
    async fn test_apply_all_creates_master_tables() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();

        let report = MigrationRunner::new(&store).apply_all(&plan).await.unwrap();

        assert_eq!(report.applied(), 3);
        assert_eq!(report.skipped(), 0);
        assert!(store.has_table("plant"));
        assert!(store.has_table("unit"));
        assert!(store.has_table("location"));
        assert!(store
            .object_exists(&SchemaObject::index("idx_location_plant_code"))
            .await
            .unwrap());
        assert!(store
            .object_exists(&SchemaObject::constraint("location", "fk_location_plant"))
            .await
            .unwrap());
        assert!(!store.lock_held());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        let runner = MigrationRunner::new(&store);

        runner.apply_all(&plan).await.unwrap();
        let objects = store.objects();
        let ddl_count = store.ddl_log().len();

        let report = runner.apply_all(&plan).await.unwrap();
        assert_eq!(report.applied(), 0);
        assert_eq!(report.skipped(), 3);
        assert!(report.units.iter().all(|u| u.outcome == UnitOutcome::Skipped));
        assert_eq!(store.objects(), objects);
        assert_eq!(store.ddl_log().len(), ddl_count);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_units() {
        let store = MemoryStore::new();
        store.fail_ddl_on("unit");
        let plan = master_migrations().unwrap();

        let err = MigrationRunner::new(&store).apply_all(&plan).await.unwrap_err();

        match &err {
            MigrationError::Failed { version, name, .. } => {
                assert_eq!(*version, 20240101000002);
                assert_eq!(name, "create_unit");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("20240101000002_create_unit"));
        assert!(store.has_table("plant"));
        assert!(!store.has_table("location"));
        assert!(!store.lock_held());
    }

    #[tokio::test]
    async fn test_partial_application_reported() {
        let store = MemoryStore::new();
        store.fail_ddl_on("fk_location_plant");
        let plan = master_migrations().unwrap();

        let err = MigrationRunner::new(&store).apply_all(&plan).await.unwrap_err();

        match err {
            MigrationError::PartiallyApplied { table, object, .. } => {
                assert_eq!(table, "location");
                assert_eq!(object, "constraint fk_location_plant on location");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.has_table("location"));
    }

    #[tokio::test]
    async fn test_rerun_completes_partial_unit() {
        let store = MemoryStore::new();
        store.fail_ddl_on("fk_location_plant");
        let plan = master_migrations().unwrap();
        let runner = MigrationRunner::new(&store);
        runner.apply_all(&plan).await.unwrap_err();

        let statuses = runner.status(&plan).await.unwrap();
        assert!(!statuses[2].applied);
        assert_eq!(
            statuses[2].missing,
            vec!["constraint fk_location_plant on location".to_string()]
        );

        // Still failing: the unit must not be reported as skipped.
        let err = runner.apply_all(&plan).await.unwrap_err();
        assert!(matches!(err, MigrationError::PartiallyApplied { .. }));

        store.clear_failures();
        let report = runner.apply_all(&plan).await.unwrap();
        assert_eq!(report.units[2].outcome, UnitOutcome::Completed);
        assert_eq!((report.skipped(), report.completed()), (2, 1));
        assert!(store
            .object_exists(&SchemaObject::constraint("location", "fk_location_plant"))
            .await
            .unwrap());
        let location_creates = store
            .ddl_log()
            .iter()
            .filter(|op| matches!(op, DdlOp::CreateTable(t) if t.name == "location"))
            .count();
        assert_eq!(location_creates, 1);
        assert!(runner.status(&plan).await.unwrap().iter().all(|s| s.applied));

        let err = store
            .insert_row(
                "location",
                &refseed_core::testing::row(&[
                    ("location_code", Some("LOC-BAD")),
                    ("plant_code", Some("TP-XX")),
                ]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::ForeignKeyViolation);
    }

    #[tokio::test]
    async fn test_missing_index_recreated() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        let runner = MigrationRunner::new(&store);
        runner.apply_all(&plan).await.unwrap();
        store
            .execute_ddl(&DdlOp::DropIndex {
                name: "idx_location_plant_code".into(),
            })
            .await
            .unwrap();

        let report = runner.apply_all(&plan).await.unwrap();
        assert_eq!(report.completed(), 1);
        assert!(store
            .object_exists(&SchemaObject::index("idx_location_plant_code"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_existing_table_is_not_recreated() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        let plant = plan.get(20240101000001).unwrap();
        store.execute_ddl(&plant.forward_ops()[0]).await.unwrap();

        let report = MigrationRunner::new(&store).apply_all(&plan).await.unwrap();

        assert_eq!(report.units[0].outcome, UnitOutcome::Skipped);
        assert_eq!(report.applied(), 2);
    }

    #[tokio::test]
    async fn test_lock_failure_stops_run() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        store.acquire_migration_lock().await.unwrap();

        let err = MigrationRunner::new(&store).apply_all(&plan).await.unwrap_err();
        assert!(matches!(err, MigrationError::Lock(_)));

        store.release_migration_lock().await.unwrap();
        store.set_offline(true);
        let err = MigrationRunner::new(&store).apply_all(&plan).await.unwrap_err();
        match err {
            MigrationError::Lock(source) => assert_eq!(source.kind, StoreErrorKind::Connection),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_revert_drops_table() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        let runner = MigrationRunner::new(&store);
        runner.apply_all(&plan).await.unwrap();

        runner.revert(plan.get(20240101000003).unwrap()).await.unwrap();
        assert!(!store.has_table("location"));
        assert!(!store
            .object_exists(&SchemaObject::index("idx_location_plant_code"))
            .await
            .unwrap());

        // Reverse operations assume the forward one succeeded.
        let err = runner.revert(plan.get(20240101000003).unwrap()).await.unwrap_err();
        assert!(matches!(err, MigrationError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_revert_last_walks_backwards() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        let runner = MigrationRunner::new(&store);
        runner.apply_all(&plan).await.unwrap();

        let reverted: Vec<String> = {
            let mut names = Vec::new();
            while let Some(unit) = runner.revert_last(&plan).await.unwrap() {
                names.push(unit.name.clone());
            }
            names
        };

        assert_eq!(reverted, vec!["create_location", "create_unit", "create_plant"]);
        assert!(store.objects().is_empty());
        assert!(!store.lock_held());
    }

    #[tokio::test]
    async fn test_status() {
        let store = MemoryStore::new();
        let plan = master_migrations().unwrap();
        let runner = MigrationRunner::new(&store);

        let before = runner.status(&plan).await.unwrap();
        assert!(before.iter().all(|s| !s.applied));

        runner.apply_all(&plan).await.unwrap();
        let after = runner.status(&plan).await.unwrap();
        assert!(after.iter().all(|s| s.applied && s.missing.is_empty()));
        assert_eq!(after[0].target, "table plant");
    }

    #[test]
    fn test_report_serializes() {
        let report = AppliedReport {
            units: vec![UnitReport {
                version: 1,
                name: "create_plant".into(),
                outcome: UnitOutcome::Skipped,
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["units"][0]["outcome"], "skipped");
    }
}
