//! Built-in migrations for the master reference tables.
//!
//! Plant and Unit have no dependencies; Location references Plant and must
//! come after it. The Location foreign key uses NO ACTION on both delete and
//! update, so a referenced plant can be neither removed nor re-keyed.

use refseed_core::schema::{ColumnDef, ForeignKeyDef, IndexDef, ReferentialAction, SqlType, TableDef};

use super::error::MigrationError;
use super::plan::MigrationPlan;
use super::unit::MigrationUnit;

pub const CREATE_PLANT_VERSION: u64 = 20240101000001;
pub const CREATE_UNIT_VERSION: u64 = 20240101000002;
pub const CREATE_LOCATION_VERSION: u64 = 20240101000003;

pub fn plant_table() -> TableDef {
    TableDef::new("plant", "plant_code")
        .column(ColumnDef::new("plant_code", SqlType::Varchar(10)))
        .column(ColumnDef::nullable("description", SqlType::Varchar(255)))
}

pub fn unit_table() -> TableDef {
    TableDef::new("unit", "unit_code")
        .column(ColumnDef::new("unit_code", SqlType::Varchar(10)))
        .column(ColumnDef::nullable("name", SqlType::Varchar(50)))
}

pub fn location_table() -> TableDef {
    TableDef::new("location", "location_code")
        .column(ColumnDef::new("location_code", SqlType::Varchar(10)))
        .column(ColumnDef::nullable("description", SqlType::Varchar(255)))
        .column(ColumnDef::nullable("plant_code", SqlType::Varchar(10)))
        .index(IndexDef::new("idx_location_plant_code", &["plant_code"]))
        .foreign_key(
            ForeignKeyDef::new("fk_location_plant", "plant_code", "plant", "plant_code")
                .on_delete(ReferentialAction::NoAction)
                .on_update(ReferentialAction::NoAction),
        )
}

/// All master-table migration units, unordered.
pub fn master_units() -> Vec<MigrationUnit> {
    vec![
        MigrationUnit::create_table(CREATE_PLANT_VERSION, "create_plant", plant_table()),
        MigrationUnit::create_table(CREATE_UNIT_VERSION, "create_unit", unit_table()),
        MigrationUnit::create_table(CREATE_LOCATION_VERSION, "create_location", location_table()),
    ]
}

/// The validated master-table migration plan.
pub fn master_migrations() -> Result<MigrationPlan, MigrationError> {
    MigrationPlan::new(master_units())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_plan_order() {
        let plan = master_migrations().unwrap();
        let ids: Vec<String> = plan.units().iter().map(|u| u.id()).collect();
        assert_eq!(
            ids,
            vec![
                "20240101000001_create_plant",
                "20240101000002_create_unit",
                "20240101000003_create_location",
            ]
        );
    }

    #[test]
    fn test_location_foreign_key_is_no_action() {
        let table = location_table();
        let fk = &table.foreign_keys[0];
        assert_eq!(fk.references_table, "plant");
        assert_eq!(fk.on_delete, ReferentialAction::NoAction);
        assert_eq!(fk.on_update, ReferentialAction::NoAction);
    }

    #[test]
    fn test_column_limits() {
        assert_eq!(plant_table().max_length("plant_code"), Some(10));
        assert_eq!(plant_table().max_length("description"), Some(255));
        assert_eq!(unit_table().max_length("name"), Some(50));
        assert!(location_table().get_column("plant_code").unwrap().nullable);
    }
}
