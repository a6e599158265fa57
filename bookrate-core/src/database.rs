use libsql::{Builder, Connection, Database};
use std::env;
use tracing::info;

use crate::common::error::{CoreError, Result};

/// Handle to the libSQL database: a local file by default, or a remote
/// Turso instance when `LIBSQL_URL`/`LIBSQL_AUTH_TOKEN` are set.
pub struct DatabaseManager {
    db: Database,
}

impl DatabaseManager {
    /// Connect to a remote Turso database using environment configuration.
    pub async fn new_remote() -> Result<Self> {
        let url = env::var("LIBSQL_URL").map_err(|_| CoreError::Database {
            message: "LIBSQL_URL environment variable not set".to_string(),
        })?;
        let auth_token = env::var("LIBSQL_AUTH_TOKEN").map_err(|_| CoreError::Database {
            message: "LIBSQL_AUTH_TOKEN environment variable not set".to_string(),
        })?;

        info!("Connecting to remote database at {}", url);

        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| CoreError::Database {
                message: format!("Failed to connect to database: {e}"),
            })?;

        Ok(Self { db })
    }

    /// Open (creating if needed) a local database file.
    pub async fn new_local(path: &str) -> Result<Self> {
        info!("Opening local database at {}", path);

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CoreError::Database {
                message: format!("Failed to open database '{path}': {e}"),
            })?;

        Ok(Self { db })
    }

    /// Get a connection to the database.
    pub fn connect(&self) -> Result<Connection> {
        self.db.connect().map_err(|e| CoreError::Database {
            message: format!("Failed to get database connection: {e}"),
        })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.connect()?;

        let migration_sql_001 = include_str!("../migrations/001_create_core_tables.sql");
        conn.execute_batch(migration_sql_001)
            .await
            .map_err(|e| CoreError::Database {
                message: format!("Failed to run base migration: {e}"),
            })?;

        let migration_sql_002 = include_str!("../migrations/002_indexes_and_pragmas.sql");
        conn.execute_batch(migration_sql_002)
            .await
            .map_err(|e| CoreError::Database {
                message: format!("Failed to run index migration: {e}"),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}
