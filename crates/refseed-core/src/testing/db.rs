//! Explicit PostgreSQL provisioning for integration tests.
//!
//! The URL always comes from the caller or from `TEST_DATABASE_URL`; the
//! `DATABASE_URL` used by the CLI is never read here, so tests cannot touch
//! a real master-data database by accident.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{RefseedError, Result};

/// Connection to a server on which per-test databases are created.
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to the database at the given URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(RefseedError::Sql)?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using `TEST_DATABASE_URL`. Returns `Ok(None)` when it is unset
    /// so integration tests can skip themselves.
    pub async fn from_env() -> Result<Option<Self>> {
        match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => Self::from_url(&url).await.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a fresh database for a single test.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        // The UUID suffix keeps parallel tests apart.
        let db_name = format!(
            "refseed_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await
            .map_err(RefseedError::Sql)?;

        let test_url = replace_db_name(&self.url, &db_name);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&test_url)
            .await
            .map_err(RefseedError::Sql)?;

        Ok(IsolatedTestDb {
            pool,
            url: test_url,
            db_name,
            base_url: self.url.clone(),
        })
    }
}

/// A database that exists for the lifetime of one test.
pub struct IsolatedTestDb {
    pool: PgPool,
    url: String,
    db_name: String,
    base_url: String,
}

impl IsolatedTestDb {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Run raw SQL against the isolated database.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(RefseedError::Sql)?;
        Ok(())
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
            .map_err(RefseedError::Sql)?;

        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
        )
        .bind(&self.db_name)
        .execute(&pool)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&pool)
            .await
            .map_err(RefseedError::Sql)?;

        Ok(())
    }
}

/// Sanitize a test name for use in a database name.
fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(24)
        .collect()
}

/// Replace the database name in a connection URL, keeping query parameters.
fn replace_db_name(url: &str, new_db: &str) -> String {
    let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[authority_start..].rfind('/') {
        Some(rel) => {
            let idx = authority_start + rel;
            let base = &url[..=idx];
            match url[idx + 1..].find('?') {
                Some(query_idx) => format!("{}{}{}", base, new_db, &url[idx + 1 + query_idx..]),
                None => format!("{}{}", base, new_db),
            }
        }
        None => format!("{}/{}", url, new_db),
    }
}
