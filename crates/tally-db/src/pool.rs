//! # Database Pool Management
//!
//! The SQLite-backed [`RecordStore`].
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SQLite Record Store                                │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ records                                                         │   │
//! │  │ seq │ collection │ id  │ body (snake_case JSON)  │ timestamps  │   │
//! │  │  1  │ lots       │ a1… │ {"variant_id":…}        │             │   │
//! │  │  2  │ variants   │ 9c… │ {"sku":"TEE-M",…}       │             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  update/delete read, filter and write inside one SQLite transaction,   │
//! │  so each store call is atomic on its own.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases run in WAL mode so readers never block the writer.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::Records;
use crate::store::{apply_patch, row_id, Collection, Filter, RecordStore, Row};

const IN_MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/tally.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Default: 5 (one back office, a handful of tills)
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for the database file at `path`, created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The pool holds exactly one connection that is never recycled; each
    /// SQLite in-memory connection is its own database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY
    }
}

// =============================================================================
// Database
// =============================================================================

/// SQLite record store handle. Cheap to clone (the pool is shared).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the database and runs migrations if enabled.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. WAL journal, NORMAL synchronous, foreign keys on
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let in_memory = config.is_in_memory();
        let connect_url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let mut connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);
        pool_options = if in_memory {
            pool_options.idle_timeout(None).max_lifetime(None)
        } else {
            pool_options.idle_timeout(Some(config.idle_timeout))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Typed repositories over this database.
    ///
    /// ```rust,ignore
    /// let lots = db.records().lots().for_variant(&variant_id).await?;
    /// ```
    pub fn records(&self) -> Records {
        Records::new(Arc::new(self.clone()))
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

fn decode_body(collection: Collection, body: &str) -> DbResult<Row> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(DbError::invalid(collection.name(), "stored body is not an object")),
        Err(e) => Err(DbError::invalid(collection.name(), e.to_string())),
    }
}

fn encode_body(collection: Collection, row: &Row) -> DbResult<String> {
    serde_json::to_string(row).map_err(|e| DbError::invalid(collection.name(), e.to_string()))
}

// =============================================================================
// RecordStore
// =============================================================================

#[async_trait]
impl RecordStore for Database {
    async fn select(&self, collection: Collection, filter: &Filter) -> DbResult<Vec<Row>> {
        let bodies: Vec<(String,)> = match filter.pinned_id() {
            Some(id) => {
                sqlx::query_as("SELECT body FROM records WHERE collection = ?1 AND id = ?2")
                    .bind(collection.name())
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT body FROM records WHERE collection = ?1 ORDER BY seq")
                    .bind(collection.name())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut rows = Vec::new();
        for (body,) in bodies {
            let row = decode_body(collection, &body)?;
            if filter.matches(&row) {
                rows.push(row);
            }
        }
        debug!(collection = %collection, count = rows.len(), "select");
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, rows: Vec<Row>) -> DbResult<Vec<Row>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for row in &rows {
            let id = row_id(collection, row)?;
            sqlx::query(
                "INSERT INTO records (collection, id, body, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )
            .bind(collection.name())
            .bind(&id)
            .bind(encode_body(collection, row)?)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate(format!("{}.id", collection), id.clone()),
                other => other,
            })?;
        }
        tx.commit().await?;
        debug!(collection = %collection, count = rows.len(), "insert");
        Ok(rows)
    }

    async fn update(&self, collection: Collection, filter: &Filter, patch: Row) -> DbResult<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let stored: Vec<(i64, String)> =
            sqlx::query_as("SELECT seq, body FROM records WHERE collection = ?1 ORDER BY seq")
                .bind(collection.name())
                .fetch_all(&mut *tx)
                .await?;

        let mut count = 0;
        for (seq, body) in stored {
            let mut row = decode_body(collection, &body)?;
            if !filter.matches(&row) {
                continue;
            }
            apply_patch(&mut row, &patch);
            sqlx::query("UPDATE records SET body = ?1, updated_at = ?2 WHERE seq = ?3")
                .bind(encode_body(collection, &row)?)
                .bind(&now)
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            count += 1;
        }
        tx.commit().await?;
        debug!(collection = %collection, count, "update");
        Ok(count)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let stored: Vec<(i64, String)> =
            sqlx::query_as("SELECT seq, body FROM records WHERE collection = ?1 ORDER BY seq")
                .bind(collection.name())
                .fetch_all(&mut *tx)
                .await?;

        let mut count = 0;
        for (seq, body) in stored {
            if !filter.matches(&decode_body(collection, &body)?) {
                continue;
            }
            sqlx::query("DELETE FROM records WHERE seq = ?1")
                .bind(seq)
                .execute(&mut *tx)
                .await?;
            count += 1;
        }
        tx.commit().await?;
        debug!(collection = %collection, count, "delete");
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_record_roundtrip_and_filters() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.insert(
            Collection::Lots,
            vec![
                row(json!({ "id": "a", "variant_id": "v1", "quantity": 10000 })),
                row(json!({ "id": "b", "variant_id": "v2", "quantity": 5000 })),
                row(json!({ "id": "c", "variant_id": "v1", "quantity": -3000 })),
            ],
        )
        .await
        .unwrap();

        let v1 = db
            .select(Collection::Lots, &Filter::eq("variant_id", "v1"))
            .await
            .unwrap();
        assert_eq!(v1.len(), 2);
        assert_eq!(v1[1]["quantity"], -3000);

        let one = db.select(Collection::Lots, &Filter::id("b")).await.unwrap();
        assert_eq!(one.len(), 1);

        // collections are isolated
        let none = db.select(Collection::Variants, &Filter::All).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_atomically() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.insert(Collection::Lots, vec![row(json!({ "id": "a" }))])
            .await
            .unwrap();

        let err = db
            .insert(
                Collection::Lots,
                vec![row(json!({ "id": "b" })), row(json!({ "id": "a" }))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let all = db.select(Collection::Lots, &Filter::All).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.insert(
            Collection::Transactions,
            vec![
                row(json!({ "id": "t1", "status": "Completed" })),
                row(json!({ "id": "t2", "status": "Completed" })),
            ],
        )
        .await
        .unwrap();

        let n = db
            .update(
                Collection::Transactions,
                &Filter::id("t2"),
                row(json!({ "status": "Void" })),
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
        let t2 = db
            .select(Collection::Transactions, &Filter::id("t2"))
            .await
            .unwrap();
        assert_eq!(t2[0]["status"], "Void");

        let n = db
            .delete(Collection::Transactions, &Filter::eq("status", "Completed"))
            .await
            .unwrap();
        assert_eq!(n, 1);
    }
}
