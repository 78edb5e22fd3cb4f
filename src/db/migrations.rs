//! Database lifecycle and schema migrations.

use crate::config::PersistenceConfig;
use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;
use std::time::Duration;

use super::Database;

/// Busy timeout used by [`Database::new`]
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        Self::connect(path, DEFAULT_BUSY_TIMEOUT).await
    }

    /// Open the database described by a [`PersistenceConfig`]
    pub async fn from_config(config: &PersistenceConfig) -> Result<Self> {
        Self::connect(&config.database_path, config.busy_timeout).await
    }

    async fn connect(path: &Path, busy_timeout: Duration) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        // WAL keeps writes crash-consistent when the host kills the process
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };

        // Run migrations
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        // Create schema version table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        // Check current version
        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        let current_version = current_version.unwrap_or(0);

        // Apply migrations
        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create the history schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // A second process may race us here; IMMEDIATE takes the write lock up front
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            let applied: Option<i64> =
                sqlx::query_scalar("SELECT version FROM schema_version WHERE version = 1")
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::QueryFailed(format!(
                            "Failed to query schema version: {}",
                            e
                        )))
                    })?;
            if applied.is_some() {
                return Ok::<(), Error>(());
            }

            Self::create_history_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    /// Create history table and its indexes
    async fn create_history_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                service TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                local_path TEXT,
                raw_log TEXT
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create history table: {}",
                e
            )))
        })?;

        for (name, ddl) in [
            (
                "idx_history_created",
                "CREATE INDEX IF NOT EXISTS idx_history_created ON history(created_at DESC)",
            ),
            (
                "idx_history_service",
                "CREATE INDEX IF NOT EXISTS idx_history_service ON history(service)",
            ),
            (
                "idx_history_status",
                "CREATE INDEX IF NOT EXISTS idx_history_status ON history(status)",
            ),
        ] {
            sqlx::query(ddl).execute(&mut *conn).await.map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to create index {}: {}",
                    name, e
                )))
            })?;
        }

        Ok(())
    }

    /// Record a migration version
    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
