mod ddl;
mod table;
mod types;

pub use ddl::{validate_identifier, DdlOp, SchemaObject, MAX_IDENTIFIER_LEN};
pub use table::{ColumnDef, ForeignKeyDef, IndexDef, TableDef};
pub use types::{ReferentialAction, SqlType};
