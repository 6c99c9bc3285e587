//! Compiled-in reference data. Adding rows here is the only way to extend
//! what `seed` loads.

use super::record::{SeedDataset, SeedRecord, TableHandle};

const PLANTS: &[(&str, &str)] = &[
    ("TP-BP12", "Thai Parkerizing Bangpoo Soi 12"),
    ("TP-BP8", "Thai Parkerizing Bangpoo Soi 8"),
    ("TP-GW", "Thai Parkerizing Gateway"),
];

const UNITS: &[(&str, &str)] = &[
    ("PCS", "Pieces"),
    ("KG", "Kilogram"),
    ("G", "Gram"),
    ("L", "Liter"),
    ("M", "Meter"),
    ("BOX", "Box"),
    ("SET", "Set"),
    ("DRUM", "Drum"),
];

// (location_code, description, plant_code)
const LOCATIONS: &[(&str, &str, &str)] = &[
    ("BP12-WH01", "Bangpoo Soi 12 Warehouse 1", "TP-BP12"),
    ("BP12-PRD", "Bangpoo Soi 12 Production", "TP-BP12"),
    ("BP8-WH01", "Bangpoo Soi 8 Warehouse 1", "TP-BP8"),
    ("GW-WH01", "Gateway Warehouse 1", "TP-GW"),
    ("GW-QC", "Gateway Quality Control", "TP-GW"),
];

pub fn plants() -> SeedDataset {
    SeedDataset::new(
        TableHandle::new("plant", "plant_code"),
        PLANTS
            .iter()
            .map(|(code, description)| {
                SeedRecord::new()
                    .with("plant_code", code)
                    .with("description", description)
            })
            .collect(),
    )
}

pub fn units() -> SeedDataset {
    SeedDataset::new(
        TableHandle::new("unit", "unit_code"),
        UNITS
            .iter()
            .map(|(code, name)| SeedRecord::new().with("unit_code", code).with("name", name))
            .collect(),
    )
}

pub fn locations() -> SeedDataset {
    SeedDataset::new(
        TableHandle::new("location", "location_code"),
        LOCATIONS
            .iter()
            .map(|(code, description, plant)| {
                SeedRecord::new()
                    .with("location_code", code)
                    .with("description", description)
                    .with("plant_code", plant)
            })
            .collect(),
    )
    .depends_on("plant")
}

/// Every master dataset, referenced tables first.
pub fn master_datasets() -> Vec<SeedDataset> {
    vec![plants(), units(), locations()]
}

/// Look up a master dataset by table name.
pub fn dataset_for(table: &str) -> Option<SeedDataset> {
    master_datasets()
        .into_iter()
        .find(|d| d.handle.table == table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_datasets_ordered_by_dependency() {
        let datasets = master_datasets();
        let mut seen = HashSet::new();
        for dataset in &datasets {
            for dep in &dataset.depends_on {
                assert!(seen.contains(dep.as_str()), "{} seeded before {}", dataset.handle.table, dep);
            }
            seen.insert(dataset.handle.table.as_str());
        }
    }

    #[test]
    fn test_natural_keys_unique_and_fit_columns() {
        for dataset in master_datasets() {
            let mut keys = HashSet::new();
            for record in &dataset.records {
                let key = record.get(&dataset.handle.key_column).unwrap();
                assert!(key.len() <= 10, "{} too long", key);
                assert!(keys.insert(key.to_string()), "duplicate key {}", key);
            }
        }
    }

    #[test]
    fn test_locations_reference_known_plants() {
        let plant_codes: HashSet<String> = plants()
            .records
            .iter()
            .filter_map(|r| r.get("plant_code").map(str::to_string))
            .collect();
        for record in &locations().records {
            assert!(plant_codes.contains(record.get("plant_code").unwrap()));
        }
    }

    #[test]
    fn test_dataset_for() {
        assert_eq!(dataset_for("plant").unwrap().records.len(), 3);
        assert!(dataset_for("customer").is_none());
    }
}
