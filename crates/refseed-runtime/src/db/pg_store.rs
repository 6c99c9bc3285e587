use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use tokio::sync::Mutex;
use tracing::debug;

use refseed_core::schema::{validate_identifier, DdlOp, SchemaObject};
use refseed_core::store::{Row, SchemaStore, StoreError};

use super::pool::Database;

/// Advisory lock ID serializing migration runs ("REFSD" in hex).
const MIGRATION_LOCK_ID: i64 = 0x5245465344;

/// [`SchemaStore`] backed by a single PostgreSQL session.
///
/// The connection is checked out of the pool for the lifetime of the store
/// and returned when it is dropped, whichever way the run ends. Holding one
/// session also keeps the advisory lock on the connection that took it.
pub struct PgStore {
    conn: Mutex<PoolConnection<Postgres>>,
}

impl PgStore {
    /// Check a connection out of the pool for one run.
    pub async fn acquire(db: &Database) -> Result<Self, StoreError> {
        let conn = db.pool().acquire().await.map_err(|e| {
            let mut err = StoreError::from(e);
            err.message = format!("Failed to acquire connection: {}", err.message);
            err
        })?;
        debug!("Acquired storage session");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn check_identifiers(names: &[&str]) -> Result<(), StoreError> {
    names
        .iter()
        .try_for_each(|name| validate_identifier(name))
        .map_err(StoreError::other)
}

/// Render a JSON object produced by `to_jsonb(row)` as a [`Row`].
fn row_from_json(value: serde_json::Value) -> Result<Row, StoreError> {
    let serde_json::Value::Object(map) = value else {
        return Err(StoreError::other("expected a JSON object row"));
    };
    Ok(map
        .into_iter()
        .map(|(column, value)| {
            let text = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            };
            (column, text)
        })
        .collect())
}

#[async_trait]
impl SchemaStore for PgStore {
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock().await;
        let exists = match object {
            SchemaObject::Table { name } => {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM information_schema.tables
                        WHERE table_schema = current_schema() AND table_name = $1
                    )
                    "#,
                )
                .bind(name)
                .fetch_one(&mut **conn)
                .await?
            }
            SchemaObject::Index { name } => {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM pg_indexes
                        WHERE schemaname = current_schema() AND indexname = $1
                    )
                    "#,
                )
                .bind(name)
                .fetch_one(&mut **conn)
                .await?
            }
            SchemaObject::Constraint { table, name } => {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (
                        SELECT 1 FROM information_schema.table_constraints
                        WHERE table_schema = current_schema()
                          AND table_name = $1
                          AND constraint_name = $2
                    )
                    "#,
                )
                .bind(table)
                .bind(name)
                .fetch_one(&mut **conn)
                .await?
            }
        };
        Ok(exists)
    }

    async fn execute_ddl(&self, op: &DdlOp) -> Result<(), StoreError> {
        op.validate().map_err(StoreError::other)?;
        let sql = op.to_sql();
        debug!(sql = %sql, "Executing DDL");

        let mut conn = self.conn.lock().await;
        sqlx::query(&sql).execute(&mut **conn).await?;
        Ok(())
    }

    async fn find_row(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, StoreError> {
        check_identifiers(&[table, key_column])?;
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} t WHERE t.{} = $1 LIMIT 1",
            table, key_column
        );

        let mut conn = self.conn.lock().await;
        let found = sqlx::query_scalar::<_, serde_json::Value>(&sql)
            .bind(key)
            .fetch_optional(&mut **conn)
            .await?;

        found.map(row_from_json).transpose()
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        if row.is_empty() {
            return Err(StoreError::other("cannot insert an empty row"));
        }
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        check_identifiers(&[table])?;
        check_identifiers(&columns)?;

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in row.values() {
            query = query.bind(value.as_deref());
        }

        let mut conn = self.conn.lock().await;
        query.execute(&mut **conn).await?;
        Ok(())
    }

    async fn delete_row(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<u64, StoreError> {
        check_identifiers(&[table, key_column])?;
        let sql = format!("DELETE FROM {} WHERE {} = $1", table, key_column);

        let mut conn = self.conn.lock().await;
        let result = sqlx::query(&sql).bind(key).execute(&mut **conn).await?;
        Ok(result.rows_affected())
    }

    async fn acquire_migration_lock(&self) -> Result<(), StoreError> {
        debug!("Acquiring migration lock...");
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut **conn)
            .await?;
        debug!("Migration lock acquired");
        Ok(())
    }

    async fn release_migration_lock(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut **conn)
            .await?;
        debug!("Migration lock released");
        Ok(())
    }
}
