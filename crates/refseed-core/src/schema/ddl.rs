use std::fmt;

use serde::{Deserialize, Serialize};

use super::table::{ForeignKeyDef, IndexDef, TableDef};

/// Maximum identifier length accepted by PostgreSQL.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A schema object whose existence can be queried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaObject {
    Table { name: String },
    Index { name: String },
    Constraint { table: String, name: String },
}

impl SchemaObject {
    pub fn table(name: impl Into<String>) -> Self {
        SchemaObject::Table { name: name.into() }
    }

    pub fn index(name: impl Into<String>) -> Self {
        SchemaObject::Index { name: name.into() }
    }

    pub fn constraint(table: impl Into<String>, name: impl Into<String>) -> Self {
        SchemaObject::Constraint {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SchemaObject::Table { name }
            | SchemaObject::Index { name }
            | SchemaObject::Constraint { name, .. } => name,
        }
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaObject::Table { name } => write!(f, "table {}", name),
            SchemaObject::Index { name } => write!(f, "index {}", name),
            SchemaObject::Constraint { table, name } => {
                write!(f, "constraint {} on {}", name, table)
            }
        }
    }
}

/// A structured DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlOp {
    CreateTable(TableDef),
    CreateIndex { table: String, index: IndexDef },
    AddForeignKey { table: String, foreign_key: ForeignKeyDef },
    DropTable { table: String },
    DropIndex { name: String },
    DropConstraint { table: String, name: String },
}

impl DdlOp {
    /// Render the statement as PostgreSQL DDL.
    pub fn to_sql(&self) -> String {
        match self {
            DdlOp::CreateTable(table) => table.to_create_table_sql(),
            DdlOp::CreateIndex { table, index } => index.to_create_sql(table),
            DdlOp::AddForeignKey { table, foreign_key } => {
                foreign_key.to_add_constraint_sql(table)
            }
            DdlOp::DropTable { table } => format!("DROP TABLE {}", table),
            DdlOp::DropIndex { name } => format!("DROP INDEX {}", name),
            DdlOp::DropConstraint { table, name } => {
                format!("ALTER TABLE {} DROP CONSTRAINT {}", table, name)
            }
        }
    }

    /// The object this statement brings into existence, if any.
    pub fn creates(&self) -> Option<SchemaObject> {
        match self {
            DdlOp::CreateTable(table) => Some(SchemaObject::table(&table.name)),
            DdlOp::CreateIndex { index, .. } => Some(SchemaObject::index(&index.name)),
            DdlOp::AddForeignKey { table, foreign_key } => {
                Some(SchemaObject::constraint(table, &foreign_key.name))
            }
            DdlOp::DropTable { .. } | DdlOp::DropIndex { .. } | DdlOp::DropConstraint { .. } => {
                None
            }
        }
    }

    /// Every identifier the statement interpolates into SQL.
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            DdlOp::CreateTable(table) => {
                let mut ids = vec![table.name.as_str(), table.primary_key.as_str()];
                ids.extend(table.columns.iter().map(|c| c.name.as_str()));
                ids
            }
            DdlOp::CreateIndex { table, index } => {
                let mut ids = vec![table.as_str(), index.name.as_str()];
                ids.extend(index.columns.iter().map(String::as_str));
                ids
            }
            DdlOp::AddForeignKey { table, foreign_key } => vec![
                table.as_str(),
                foreign_key.name.as_str(),
                foreign_key.column.as_str(),
                foreign_key.references_table.as_str(),
                foreign_key.references_column.as_str(),
            ],
            DdlOp::DropTable { table } => vec![table.as_str()],
            DdlOp::DropIndex { name } => vec![name.as_str()],
            DdlOp::DropConstraint { table, name } => vec![table.as_str(), name.as_str()],
        }
    }

    /// Validate every identifier in the statement.
    pub fn validate(&self) -> Result<(), String> {
        self.identifiers().into_iter().try_for_each(validate_identifier)
    }
}

/// Accept only lowercase unquoted identifiers so names can be interpolated
/// into SQL without quoting.
pub fn validate_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_start || !valid_rest {
        return Err(format!("invalid identifier '{}'", name));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier '{}' exceeds {} characters",
            name, MAX_IDENTIFIER_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, SqlType};

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("plant_code").is_ok());
        assert!(validate_identifier("_tmp1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1plant").is_err());
        assert!(validate_identifier("Plant").is_err());
        assert!(validate_identifier("plant; DROP TABLE unit").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_ddl_to_sql() {
        assert_eq!(
            DdlOp::DropTable { table: "plant".into() }.to_sql(),
            "DROP TABLE plant"
        );
        assert_eq!(
            DdlOp::DropConstraint {
                table: "location".into(),
                name: "fk_location_plant".into(),
            }
            .to_sql(),
            "ALTER TABLE location DROP CONSTRAINT fk_location_plant"
        );
    }

    #[test]
    fn test_validate_rejects_bad_column() {
        let table = TableDef::new("plant", "plant_code")
            .column(ColumnDef::new("plant_code", SqlType::Varchar(10)))
            .column(ColumnDef::new("bad-name", SqlType::Text));
        assert!(DdlOp::CreateTable(table).validate().is_err());
    }

    #[test]
    fn test_schema_object_display() {
        assert_eq!(SchemaObject::table("plant").to_string(), "table plant");
        assert_eq!(
            SchemaObject::constraint("location", "fk_location_plant").to_string(),
            "constraint fk_location_plant on location"
        );
        assert_eq!(SchemaObject::index("idx").name(), "idx");
    }

    #[test]
    fn test_creates() {
        let op = DdlOp::AddForeignKey {
            table: "location".into(),
            foreign_key: ForeignKeyDef::new("fk_location_plant", "plant_code", "plant", "plant_code"),
        };
        assert_eq!(
            op.creates(),
            Some(SchemaObject::constraint("location", "fk_location_plant"))
        );
        assert_eq!(DdlOp::DropIndex { name: "idx".into() }.creates(), None);
    }
}
