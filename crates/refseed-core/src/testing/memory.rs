//! In-memory [`SchemaStore`] for tests.
//!
//! Interprets [`DdlOp`]s and enforces the constraints the migrations declare:
//! primary keys, NOT NULL, VARCHAR lengths and foreign keys, which always
//! reject removing a referenced row. Failures can be injected per object, per row key, or
//! for the whole store (offline).

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::schema::{DdlOp, ForeignKeyDef, SchemaObject, TableDef};
use crate::store::{Row, SchemaStore, StoreError, StoreErrorKind};

/// Shared in-memory database. Clones see the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, MemTable>,
    /// Index name -> owning table.
    indexes: BTreeMap<String, String>,
    offline: bool,
    /// Successful inserts left before the store goes offline.
    inserts_before_offline: Option<usize>,
    fail_ddl: HashSet<String>,
    fail_insert: HashSet<(String, String)>,
    ddl_log: Vec<DdlOp>,
    lock_held: bool,
    lock_acquisitions: usize,
}

struct MemTable {
    def: TableDef,
    foreign_keys: Vec<ForeignKeyDef>,
    /// Rows keyed by primary key value.
    rows: BTreeMap<String, Row>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic in another test thread must not cascade into this one.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Go offline once `count` more inserts have succeeded.
    pub fn go_offline_after_inserts(&self, count: usize) {
        self.state().inserts_before_offline = Some(count);
    }

    /// Fail any DDL statement that creates, alters or drops `object_name`.
    pub fn fail_ddl_on(&self, object_name: &str) {
        self.state().fail_ddl.insert(object_name.to_string());
    }

    /// Fail inserts into `table` of the row whose primary key is `key`.
    pub fn fail_insert_on(&self, table: &str, key: &str) {
        self.state()
            .fail_insert
            .insert((table.to_string(), key.to_string()));
    }

    /// Drop all injected DDL and insert failures.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_ddl.clear();
        state.fail_insert.clear();
    }

    /// DDL statements executed successfully, in order.
    pub fn ddl_log(&self) -> Vec<DdlOp> {
        self.state().ddl_log.clone()
    }

    /// All existing schema objects, sorted.
    pub fn objects(&self) -> Vec<SchemaObject> {
        let state = self.state();
        let mut objects = Vec::new();
        for (name, table) in &state.tables {
            objects.push(SchemaObject::table(name));
            for fk in &table.foreign_keys {
                objects.push(SchemaObject::constraint(name, &fk.name));
            }
        }
        for name in state.indexes.keys() {
            objects.push(SchemaObject::index(name));
        }
        objects.sort_by_key(|o| o.to_string());
        objects
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state().tables.contains_key(name)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Rows of `table` ordered by primary key.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn lock_held(&self) -> bool {
        self.state().lock_held
    }

    pub fn lock_acquisitions(&self) -> usize {
        self.state().lock_acquisitions
    }
}

impl State {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::connection("connection refused"));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemTable, StoreError> {
        self.tables.get(name).ok_or_else(|| undefined(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, StoreError> {
        self.tables.get_mut(name).ok_or_else(|| undefined(name))
    }

    fn apply_ddl(&mut self, op: &DdlOp) -> Result<(), StoreError> {
        match op {
            DdlOp::CreateTable(def) => {
                if self.tables.contains_key(&def.name) {
                    return Err(duplicate(&def.name));
                }
                // Indexes and foreign keys arrive as separate statements.
                let mut def = def.clone();
                def.foreign_keys.clear();
                def.indexes.clear();
                self.tables.insert(
                    def.name.clone(),
                    MemTable {
                        def,
                        foreign_keys: Vec::new(),
                        rows: BTreeMap::new(),
                    },
                );
            }
            DdlOp::CreateIndex { table, index } => {
                let owner = self.table(table)?;
                if let Some(col) = index.columns.iter().find(|c| owner.def.get_column(c).is_none()) {
                    return Err(StoreError::other(format!(
                        "column \"{}\" does not exist",
                        col
                    )));
                }
                if self.indexes.contains_key(&index.name) {
                    return Err(duplicate(&index.name));
                }
                self.indexes.insert(index.name.clone(), table.clone());
            }
            DdlOp::AddForeignKey { table, foreign_key } => {
                let referenced = self.table(&foreign_key.references_table)?;
                if referenced.def.primary_key != foreign_key.references_column {
                    return Err(StoreError::other(format!(
                        "no unique constraint matching given keys for referenced table \"{}\"",
                        foreign_key.references_table
                    )));
                }
                let referenced_keys: HashSet<String> = referenced.rows.keys().cloned().collect();

                let owner = self.table(table)?;
                if owner.def.get_column(&foreign_key.column).is_none() {
                    return Err(StoreError::other(format!(
                        "column \"{}\" does not exist",
                        foreign_key.column
                    )));
                }
                if owner.foreign_keys.iter().any(|fk| fk.name == foreign_key.name) {
                    return Err(duplicate(&foreign_key.name));
                }
                let orphaned = owner.rows.values().any(|row| {
                    matches!(row.get(&foreign_key.column), Some(Some(v)) if !referenced_keys.contains(v))
                });
                if orphaned {
                    return Err(fk_violation(&foreign_key.name, table));
                }

                self.table_mut(table)?.foreign_keys.push(foreign_key.clone());
            }
            DdlOp::DropTable { table } => {
                self.table(table)?;
                let dependent = self.tables.iter().find(|(name, t)| {
                    name.as_str() != table.as_str() && t.foreign_keys.iter().any(|fk| &fk.references_table == table)
                });
                if let Some((name, _)) = dependent {
                    return Err(StoreError::other(format!(
                        "cannot drop table {} because table {} depends on it",
                        table, name
                    )));
                }
                self.tables.remove(table);
                self.indexes.retain(|_, owner| owner.as_str() != table.as_str());
            }
            DdlOp::DropIndex { name } => {
                if self.indexes.remove(name).is_none() {
                    return Err(undefined(name));
                }
            }
            DdlOp::DropConstraint { table, name } => {
                let owner = self.table_mut(table)?;
                let before = owner.foreign_keys.len();
                owner.foreign_keys.retain(|fk| &fk.name != name);
                if owner.foreign_keys.len() == before {
                    return Err(undefined(name));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, table: &str, row: &Row) -> Result<(), StoreError> {
        let owner = self.table(table)?;
        let def = &owner.def;

        if let Some(column) = row.keys().find(|c| def.get_column(c).is_none()) {
            return Err(StoreError::other(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                column, table
            )));
        }

        let mut full = Row::new();
        for column in &def.columns {
            let value = row.get(&column.name).cloned().flatten();
            let required = !column.nullable || column.name == def.primary_key;
            match &value {
                None if required => {
                    return Err(StoreError::new(
                        StoreErrorKind::NotNullViolation,
                        format!(
                            "null value in column \"{}\" of relation \"{}\"",
                            column.name, table
                        ),
                    ));
                }
                Some(v) => {
                    if let Some(max) = column.sql_type.max_length() {
                        if v.chars().count() > max {
                            return Err(StoreError::new(
                                StoreErrorKind::ValueTooLong,
                                format!("value too long for type character varying({})", max),
                            ));
                        }
                    }
                }
                None => {}
            }
            full.insert(column.name.clone(), value);
        }

        let key = match full.get(&def.primary_key) {
            Some(Some(key)) => key.clone(),
            _ => return Err(StoreError::other("row has no primary key")),
        };

        if self.fail_insert.contains(&(table.to_string(), key.clone())) {
            return Err(StoreError::other(format!(
                "injected insert failure for {}.{}",
                table, key
            )));
        }

        if owner.rows.contains_key(&key) {
            return Err(StoreError::new(
                StoreErrorKind::UniqueViolation,
                format!("duplicate key value violates unique constraint \"{}_pkey\"", table),
            ));
        }

        for fk in &owner.foreign_keys {
            if let Some(Some(value)) = full.get(&fk.column) {
                if !self.table(&fk.references_table)?.rows.contains_key(value) {
                    return Err(fk_violation(&fk.name, table));
                }
            }
        }

        self.table_mut(table)?.rows.insert(key, full);
        Ok(())
    }

    fn delete(&mut self, table: &str, key_column: &str, key: &str) -> Result<u64, StoreError> {
        let owner = self.table(table)?;
        let doomed: Vec<String> = owner
            .rows
            .iter()
            .filter(|(_, row)| matches!(row.get(key_column), Some(Some(v)) if v == key))
            .map(|(pk, _)| pk.clone())
            .collect();

        // Foreign keys always reference the primary key (checked when added).
        for (child, t) in &self.tables {
            for fk in t.foreign_keys.iter().filter(|fk| fk.references_table == table) {
                let blocked = t
                    .rows
                    .values()
                    .any(|row| matches!(row.get(&fk.column), Some(Some(v)) if doomed.contains(v)));
                if blocked {
                    return Err(StoreError::new(
                        StoreErrorKind::ForeignKeyViolation,
                        format!(
                            "update or delete on table \"{}\" violates foreign key constraint \"{}\" on table \"{}\"",
                            table, fk.name, child
                        ),
                    ));
                }
            }
        }

        let owner = self.table_mut(table)?;
        for pk in &doomed {
            owner.rows.remove(pk);
        }
        Ok(doomed.len() as u64)
    }
}

fn undefined(name: &str) -> StoreError {
    StoreError::new(
        StoreErrorKind::UndefinedObject,
        format!("relation \"{}\" does not exist", name),
    )
}

fn duplicate(name: &str) -> StoreError {
    StoreError::new(
        StoreErrorKind::DuplicateObject,
        format!("relation \"{}\" already exists", name),
    )
}

fn fk_violation(constraint: &str, table: &str) -> StoreError {
    StoreError::new(
        StoreErrorKind::ForeignKeyViolation,
        format!(
            "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
            table, constraint
        ),
    )
}

fn ddl_target(op: &DdlOp) -> &str {
    match op {
        DdlOp::CreateTable(def) => &def.name,
        DdlOp::CreateIndex { index, .. } => &index.name,
        DdlOp::AddForeignKey { foreign_key, .. } => &foreign_key.name,
        DdlOp::DropTable { table } => table,
        DdlOp::DropIndex { name } => name,
        DdlOp::DropConstraint { name, .. } => name,
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StoreError> {
        let state = self.state();
        state.check_online()?;
        Ok(match object {
            SchemaObject::Table { name } => state.tables.contains_key(name),
            SchemaObject::Index { name } => state.indexes.contains_key(name),
            SchemaObject::Constraint { table, name } => state
                .tables
                .get(table)
                .map(|t| t.foreign_keys.iter().any(|fk| &fk.name == name))
                .unwrap_or(false),
        })
    }

    async fn execute_ddl(&self, op: &DdlOp) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_online()?;
        op.validate().map_err(StoreError::other)?;

        let target = ddl_target(op);
        if state.fail_ddl.contains(target) {
            return Err(StoreError::other(format!(
                "injected DDL failure for {}",
                target
            )));
        }

        state.apply_ddl(op)?;
        state.ddl_log.push(op.clone());
        Ok(())
    }

    async fn find_row(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, StoreError> {
        let state = self.state();
        state.check_online()?;
        let owner = state.table(table)?;
        if owner.def.get_column(key_column).is_none() {
            return Err(StoreError::other(format!(
                "column \"{}\" does not exist",
                key_column
            )));
        }
        Ok(owner
            .rows
            .values()
            .find(|row| matches!(row.get(key_column), Some(Some(v)) if v == key))
            .cloned())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let mut state = self.state();
        match state.inserts_before_offline {
            Some(0) => {
                state.offline = true;
                state.inserts_before_offline = None;
            }
            Some(n) => state.inserts_before_offline = Some(n - 1),
            None => {}
        }
        state.check_online()?;
        state.insert(table, row)
    }

    async fn delete_row(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.check_online()?;
        state.delete(table, key_column, key)
    }

    async fn acquire_migration_lock(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_online()?;
        if state.lock_held {
            return Err(StoreError::other("migration lock is already held"));
        }
        state.lock_held = true;
        state.lock_acquisitions += 1;
        Ok(())
    }

    async fn release_migration_lock(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_online()?;
        state.lock_held = false;
        Ok(())
    }
}
