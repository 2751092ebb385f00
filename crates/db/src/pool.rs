//! Database connection pool management.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

const IN_MEMORY: &str = ":memory:";

/// Database connection pool wrapper.
///
/// This provides a safe async wrapper for database access from Tokio tasks.
#[derive(Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Create a new database pool from a SQLite database path.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file, or `:memory:`
    ///
    /// # Returns
    /// A new `DbPool` instance
    pub async fn new(db_path: &str) -> Result<Self> {
        if db_path == IN_MEMORY {
            return Self::in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(db_path)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        info!("Connected to database at {}", db_path);

        Ok(Self { pool })
    }

    /// Create a pool over a private in-memory database.
    ///
    /// Every SQLite connection opens its own in-memory database, so the pool
    /// holds exactly one connection and never recycles it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(IN_MEMORY)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        info!("Connected to in-memory database");

        Ok(Self { pool })
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a migration to set up the database schema.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations completed");
        Ok(())
    }
}
