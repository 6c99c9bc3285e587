use std::fmt;

use serde::Serialize;

use refseed_core::schema::{DdlOp, ForeignKeyDef, IndexDef, SchemaObject, TableDef};

/// The forward transformation of a migration unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaChange {
    /// Create a table together with its declared indexes and foreign keys.
    CreateTable(TableDef),
    CreateIndex { table: String, index: IndexDef },
    AddForeignKey { table: String, foreign_key: ForeignKeyDef },
}

/// A single versioned schema transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationUnit {
    /// Ordering key, e.g. `20240101000001`.
    pub version: u64,
    pub name: String,
    pub forward: SchemaChange,
    /// Executed unconditionally by `revert`, in order.
    pub reverse: Vec<DdlOp>,
}

impl MigrationUnit {
    /// Create `table`; reverting drops it.
    pub fn create_table(version: u64, name: impl Into<String>, table: TableDef) -> Self {
        let reverse = vec![DdlOp::DropTable {
            table: table.name.clone(),
        }];
        Self {
            version,
            name: name.into(),
            forward: SchemaChange::CreateTable(table),
            reverse,
        }
    }

    /// Create an index on an existing table; reverting drops it.
    pub fn create_index(
        version: u64,
        name: impl Into<String>,
        table: impl Into<String>,
        index: IndexDef,
    ) -> Self {
        let reverse = vec![DdlOp::DropIndex {
            name: index.name.clone(),
        }];
        Self {
            version,
            name: name.into(),
            forward: SchemaChange::CreateIndex {
                table: table.into(),
                index,
            },
            reverse,
        }
    }

    /// Add a foreign key to an existing table; reverting drops it.
    pub fn add_foreign_key(
        version: u64,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: ForeignKeyDef,
    ) -> Self {
        let table = table.into();
        let reverse = vec![DdlOp::DropConstraint {
            table: table.clone(),
            name: foreign_key.name.clone(),
        }];
        Self {
            version,
            name: name.into(),
            forward: SchemaChange::AddForeignKey { table, foreign_key },
            reverse,
        }
    }

    /// Replace the derived reverse operation.
    pub fn with_reverse(mut self, reverse: Vec<DdlOp>) -> Self {
        self.reverse = reverse;
        self
    }

    /// The object whose existence means this unit is already applied.
    pub fn target(&self) -> SchemaObject {
        match &self.forward {
            SchemaChange::CreateTable(table) => SchemaObject::table(&table.name),
            SchemaChange::CreateIndex { index, .. } => SchemaObject::index(&index.name),
            SchemaChange::AddForeignKey { table, foreign_key } => {
                SchemaObject::constraint(table, &foreign_key.name)
            }
        }
    }

    /// The table this unit creates, if any.
    pub fn creates_table(&self) -> Option<&str> {
        match &self.forward {
            SchemaChange::CreateTable(table) => Some(&table.name),
            _ => None,
        }
    }

    /// Tables that must exist before this unit runs.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps = match &self.forward {
            SchemaChange::CreateTable(table) => table.referenced_tables(),
            SchemaChange::CreateIndex { table, .. } => vec![table.as_str()],
            SchemaChange::AddForeignKey { table, foreign_key } => {
                vec![table.as_str(), foreign_key.references_table.as_str()]
            }
        };
        deps.dedup();
        deps
    }

    /// Statements the forward operation executes, in order.
    pub fn forward_ops(&self) -> Vec<DdlOp> {
        match &self.forward {
            SchemaChange::CreateTable(table) => {
                let mut ops = vec![DdlOp::CreateTable(table.clone())];
                ops.extend(table.indexes.iter().map(|index| DdlOp::CreateIndex {
                    table: table.name.clone(),
                    index: index.clone(),
                }));
                ops.extend(table.foreign_keys.iter().map(|fk| DdlOp::AddForeignKey {
                    table: table.name.clone(),
                    foreign_key: fk.clone(),
                }));
                ops
            }
            SchemaChange::CreateIndex { table, index } => vec![DdlOp::CreateIndex {
                table: table.clone(),
                index: index.clone(),
            }],
            SchemaChange::AddForeignKey { table, foreign_key } => vec![DdlOp::AddForeignKey {
                table: table.clone(),
                foreign_key: foreign_key.clone(),
            }],
        }
    }

    /// Every object the unit declares, paired with the statement creating it.
    ///
    /// The first entry is the unit's target.
    pub fn steps(&self) -> Vec<(SchemaObject, DdlOp)> {
        self.forward_ops()
            .into_iter()
            .filter_map(|op| op.creates().map(|object| (object, op)))
            .collect()
    }

    /// Full identifier, e.g. `20240101000001_create_plant`.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.version, self.name)
    }
}
