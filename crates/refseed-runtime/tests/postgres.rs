//! Integration tests against a real PostgreSQL server.
//!
//! Skipped unless TEST_DATABASE_URL points at a server where the test user
//! may create databases.

use refseed_core::store::{SchemaStore, StoreError, StoreErrorKind};
use refseed_core::testing::{row, IsolatedTestDb, TestDatabase};
use refseed_runtime::{master_datasets, master_migrations, Database, MigrationRunner, PgStore, SeedEngine};

async fn isolated(name: &str) -> Option<IsolatedTestDb> {
    let base = TestDatabase::from_env().await.unwrap()?;
    Some(base.isolated(name).await.unwrap())
}

#[tokio::test]
async fn migrate_and_seed_roundtrip() {
    let Some(test_db) = isolated("migrate_and_seed").await else {
        return;
    };
    let db = Database::from_pool(test_db.pool().clone());
    let store = PgStore::acquire(&db).await.unwrap();
    let plan = master_migrations().unwrap();
    let runner = MigrationRunner::new(&store);

    let first = runner.apply_all(&plan).await.unwrap();
    assert_eq!(first.applied(), 3);
    let second = runner.apply_all(&plan).await.unwrap();
    assert_eq!(second.skipped(), 3);

    let engine = SeedEngine::new(&store);
    let reports = engine.seed_all(&master_datasets()).await.unwrap();
    assert!(reports.iter().all(|r| r.is_clean() && r.skipped == 0));
    let again = engine.seed_all(&master_datasets()).await.unwrap();
    assert!(again.iter().all(|r| r.created == 0));

    let err = store
        .insert_row(
            "location",
            &row(&[("location_code", Some("LOC-BAD")), ("plant_code", Some("TP-XX"))]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::ForeignKeyViolation);

    let err = store
        .delete_row("plant", "plant_code", "TP-BP12")
        .await
        .unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::ForeignKeyViolation);

    // Re-keying a referenced plant is rejected as well.
    let err = sqlx::query("UPDATE plant SET plant_code = 'TP-NEW' WHERE plant_code = 'TP-BP12'")
        .execute(test_db.pool())
        .await
        .unwrap_err();
    assert_eq!(StoreError::from(err).kind, StoreErrorKind::ForeignKeyViolation);
    assert!(store
        .find_row("plant", "plant_code", "TP-BP12")
        .await
        .unwrap()
        .is_some());

    drop(store);
    db.close().await;
    test_db.cleanup().await.unwrap();
}

#[tokio::test]
async fn revert_last_drops_location() {
    let Some(test_db) = isolated("revert_last").await else {
        return;
    };
    let db = Database::from_pool(test_db.pool().clone());
    let store = PgStore::acquire(&db).await.unwrap();
    let plan = master_migrations().unwrap();
    let runner = MigrationRunner::new(&store);

    runner.apply_all(&plan).await.unwrap();
    let reverted = runner.revert_last(&plan).await.unwrap().unwrap();
    assert_eq!(reverted.name, "create_location");

    let statuses = runner.status(&plan).await.unwrap();
    assert!(!statuses[2].applied);
    assert!(statuses[0].applied);

    drop(store);
    db.close().await;
    test_db.cleanup().await.unwrap();
}

#[tokio::test]
async fn rerun_after_dropped_constraint_restores_it() {
    let Some(test_db) = isolated("rerun_restores_fk").await else {
        return;
    };
    let db = Database::from_pool(test_db.pool().clone());
    let store = PgStore::acquire(&db).await.unwrap();
    let plan = master_migrations().unwrap();
    let runner = MigrationRunner::new(&store);

    runner.apply_all(&plan).await.unwrap();
    test_db
        .execute("ALTER TABLE location DROP CONSTRAINT fk_location_plant")
        .await
        .unwrap();
    assert!(!runner.status(&plan).await.unwrap()[2].applied);

    let report = runner.apply_all(&plan).await.unwrap();
    assert_eq!(report.completed(), 1);
    let err = store
        .insert_row(
            "location",
            &row(&[("location_code", Some("LOC-BAD")), ("plant_code", Some("TP-XX"))]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::ForeignKeyViolation);

    drop(store);
    db.close().await;
    test_db.cleanup().await.unwrap();
}
