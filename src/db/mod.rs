//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for:
//! - Installed module records and their permission grants
//! - Per-(session, participant) state records with embedded locks
//! - The store-and-forward mailbox (pending messages)
//! - Private per-module scoped collections
//!
//! Every coordination primitive in this module is expressed as a single
//! conditional statement so that multiple processes sharing one database
//! cannot race between inspection and write.

pub mod mailbox;
pub mod modules;
mod scoped;
pub mod state;

pub use mailbox::{MailboxRepository, MessageStatus, MessageType, PendingMessage};
pub use modules::{
    ModuleKind, ModuleManifest, ModulePermission, ModuleRecord, ModuleRepository, ModuleStatus,
    PermissionRequest, RegistryInvalidation,
};
pub use scoped::ScopedStore;
pub use state::{SessionState, StateLock, StateMetadata, StateRecord, StateRepository, StateUpdate};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("module not found: {0}")]
    ModuleNotFound(String),
    #[error("module {module_id} never requested permission '{name}'")]
    PermissionNotDeclared { module_id: String, name: String },
    #[error("invalid session state: {0}")]
    InvalidState(String),
    #[error("invalid module status: {0}")]
    InvalidStatus(String),
    #[error("invalid message type: {0}")]
    InvalidMessageType(String),
    #[error("payload encode/decode error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:veristate-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            // File-based database; create the parent directory if missing.
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        // Run embedded migrations
        Self::run_migrations(&pool).await?;

        // WAL mode allows reads to happen while writes are in progress
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Foreign key constraints are required for ON DELETE CASCADE
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        // NORMAL provides good durability while being faster than FULL
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        // Check database integrity on startup (prevents silent corruption from crashes)
        let integrity_result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&pool)
            .await?;

        if integrity_result != "ok" {
            tracing::error!(
                integrity_check = %integrity_result,
                "Database integrity check FAILED - corruption detected!"
            );
            return Err(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Database integrity check failed: {}", integrity_result),
            ))));
        }

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run embedded migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get module repository.
    pub fn modules(&self) -> ModuleRepository<'_> {
        ModuleRepository::new(&self.pool)
    }

    /// Get state record repository.
    pub fn state(&self) -> StateRepository<'_> {
        StateRepository::new(&self.pool)
    }

    /// Get mailbox repository.
    pub fn mailbox(&self) -> MailboxRepository<'_> {
        MailboxRepository::new(&self.pool)
    }

    /// Create a scoped store bound to exactly one module id.
    ///
    /// All collections created through the returned handle are namespaced
    /// under the module id; the handle exposes no way to re-target it.
    pub fn scoped(&self, module_id: &str) -> ScopedStore<'_> {
        ScopedStore::new(&self.pool, module_id)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err)
    }
}
