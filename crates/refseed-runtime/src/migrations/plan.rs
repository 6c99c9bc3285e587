use std::collections::HashMap;

use super::error::MigrationError;
use super::unit::MigrationUnit;

/// A validated, version-ordered sequence of migration units.
///
/// Construction fails if two units share a version, if a unit names an
/// invalid identifier, or if a unit depends on a table that is not created
/// by a strictly earlier unit.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    units: Vec<MigrationUnit>,
}

impl MigrationPlan {
    pub fn new(mut units: Vec<MigrationUnit>) -> Result<Self, MigrationError> {
        units.sort_by_key(|u| u.version);

        for pair in units.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrationError::DuplicateVersion {
                    version: pair[1].version,
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        for unit in &units {
            if let Some(reason) = unit
                .forward_ops()
                .iter()
                .chain(unit.reverse.iter())
                .find_map(|op| op.validate().err())
            {
                return Err(MigrationError::InvalidUnit {
                    version: unit.version,
                    name: unit.name.clone(),
                    reason,
                });
            }
        }

        let providers: HashMap<&str, (usize, &MigrationUnit)> = units
            .iter()
            .enumerate()
            .filter_map(|(pos, unit)| unit.creates_table().map(|t| (t, (pos, unit))))
            .collect();

        for (pos, unit) in units.iter().enumerate() {
            for table in unit.dependencies() {
                match providers.get(table) {
                    Some((provider_pos, _)) if *provider_pos < pos => {}
                    // A table referencing itself is created by its own unit.
                    Some((provider_pos, _)) if *provider_pos == pos => {}
                    Some((_, provider)) => {
                        return Err(MigrationError::DependencyOrder {
                            version: unit.version,
                            name: unit.name.clone(),
                            table: table.to_string(),
                            provider: provider.id(),
                        });
                    }
                    None => {
                        return Err(MigrationError::UnresolvedDependency {
                            version: unit.version,
                            name: unit.name.clone(),
                            table: table.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self { units })
    }

    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Look up a unit by version.
    pub fn get(&self, version: u64) -> Option<&MigrationUnit> {
        self.units.iter().find(|u| u.version == version)
    }
}
