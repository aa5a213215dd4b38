//! # Ledger Database
//!
//! SQLite pool for [`SqliteLedgerStore`](crate::repositories::SqliteLedgerStore).
//!
//! File-backed pools run in WAL mode and wait on a busy database, so shard
//! workers in separate processes can share one ledger file. Migrations from
//! `migrations/` are applied before the pool is handed out.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("metadata.db")).await?;
//! let store = SqliteLedgerStore::new(pool);
//! ```
//!
//! Every connection to `:memory:` opens its own database, so the in-memory
//! pool used by tests is pinned to one connection that never expires.

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the ledger database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    in_memory: bool,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_url: format!("sqlite:{}", database_path.into().display()),
            max_connections: 2,
            in_memory: false,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            in_memory: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }
}

/// Open the pool and apply migrations.
///
/// # Errors
///
/// - [`LibraryError::Database`] if the database cannot be opened
/// - [`LibraryError::Migration`] if a migration fails
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(database_url = %config.database_url, "Opening ledger database");

    let mut connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(LibraryError::Database)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !config.in_memory {
        connect_options = connect_options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
    if config.in_memory {
        pool_options = pool_options
            .min_connections(1)
            .max_lifetime(None)
            .idle_timeout(None);
    }

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open ledger database");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| LibraryError::Migration(e.to_string()))?;

    Ok(pool)
}

/// In-memory pool with migrations applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}
