//! End-to-end behaviour of migrations plus seeding against the in-memory store.

use refseed_core::store::{SchemaStore, StoreErrorKind};
use refseed_core::testing::{row, MemoryStore};
use refseed_runtime::migrations::{location_table, plant_table};
use refseed_runtime::seed::{locations, plants};
use refseed_runtime::{
    master_datasets, master_migrations, MigrationError, MigrationPlan, MigrationRunner,
    MigrationUnit, SeedEngine, SeedRecord, TableHandle,
};

async fn migrated_store() -> MemoryStore {
    let store = MemoryStore::new();
    let plan = master_migrations().unwrap();
    MigrationRunner::new(&store).apply_all(&plan).await.unwrap();
    store
}

#[tokio::test]
async fn migrations_converge_on_second_run() {
    let store = MemoryStore::new();
    let plan = master_migrations().unwrap();
    let runner = MigrationRunner::new(&store);

    let first = runner.apply_all(&plan).await.unwrap();
    assert_eq!(first.applied(), plan.len());
    let schema_after_first = store.objects();

    let second = runner.apply_all(&plan).await.unwrap();
    assert_eq!(second.applied(), 0);
    assert_eq!(second.skipped(), plan.len());
    assert_eq!(store.objects(), schema_after_first);
    assert!(!store.lock_held());
}

#[test]
fn location_before_plant_is_rejected() {
    let units = vec![
        MigrationUnit::create_table(1, "create_location", location_table()),
        MigrationUnit::create_table(2, "create_plant", plant_table()),
    ];

    let err = MigrationPlan::new(units).unwrap_err();
    match err {
        MigrationError::DependencyOrder {
            version,
            table,
            provider,
            ..
        } => {
            assert_eq!(version, 1);
            assert_eq!(table, "plant");
            assert_eq!(provider, "2_create_plant");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn referenced_plant_cannot_be_deleted() {
    let store = migrated_store().await;
    store
        .insert_row("plant", &row(&[("plant_code", Some("P1"))]))
        .await
        .unwrap();
    store
        .insert_row(
            "location",
            &row(&[("location_code", Some("L1")), ("plant_code", Some("P1"))]),
        )
        .await
        .unwrap();

    let err = store.delete_row("plant", "plant_code", "P1").await.unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::ForeignKeyViolation);

    assert_eq!(store.row_count("plant"), 1);
    let location = store
        .find_row("location", "location_code", "L1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(location["plant_code"].as_deref(), Some("P1"));
}

#[tokio::test]
async fn plant_seed_scenario() {
    let store = migrated_store().await;
    let engine = SeedEngine::new(&store);

    let first = engine.seed_dataset(&plants()).await.unwrap();
    assert_eq!((first.created, first.skipped), (3, 0));
    let second = engine.seed_dataset(&plants()).await.unwrap();
    assert_eq!((second.created, second.skipped), (0, 3));

    let handle = TableHandle::new("location", "location_code");
    let records = vec![
        SeedRecord::new()
            .with("location_code", "LOC-OK")
            .with("plant_code", "TP-BP12"),
        SeedRecord::new()
            .with("location_code", "LOC-BAD")
            .with("plant_code", "TP-XX"),
    ];
    let report = engine.seed(&records, &handle).await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key.as_deref(), Some("LOC-BAD"));
    assert_eq!(report.failed[0].error.kind, StoreErrorKind::ForeignKeyViolation);
}

#[tokio::test]
async fn partial_failure_keeps_neighbours() {
    let store = migrated_store().await;
    store
        .insert_row("unit", &row(&[("unit_code", Some("U2"))]))
        .await
        .unwrap();
    store.fail_insert_on("unit", "U2B");

    let handle = TableHandle::new("unit", "unit_code");
    let records = vec![
        SeedRecord::new().with("unit_code", "U1"),
        SeedRecord::new().with("unit_code", "U2B"),
        SeedRecord::new().with("unit_code", "U3"),
    ];
    let report = SeedEngine::new(&store).seed(&records, &handle).await.unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].record, records[1]);
    for key in ["U1", "U3"] {
        assert!(store.find_row("unit", "unit_code", key).await.unwrap().is_some());
    }
    assert!(store.find_row("unit", "unit_code", "U2B").await.unwrap().is_none());
}

#[tokio::test]
async fn full_bootstrap_then_revert() {
    let store = migrated_store().await;
    let engine = SeedEngine::new(&store);
    let reports = engine.seed_all(&master_datasets()).await.unwrap();
    assert!(reports.iter().all(|r| r.is_clean()));
    assert_eq!(store.row_count("location"), locations().records.len());

    let plan = master_migrations().unwrap();
    let runner = MigrationRunner::new(&store);
    let reverted = runner.revert_last(&plan).await.unwrap().unwrap();
    assert_eq!(reverted.name, "create_location");
    assert!(!store.has_table("location"));

    let statuses = runner.status(&plan).await.unwrap();
    let applied: Vec<bool> = statuses.iter().map(|s| s.applied).collect();
    assert_eq!(applied, vec![true, true, false]);
}
