//! Database layer for Casedesk
//!
//! Provides:
//! - SeaORM entity models
//! - Storage traits consumed by the evaluators
//! - Repository pattern for data access
//! - Connection pool management
//! - An in-memory store for tests

#[cfg(any(test, feature = "test-util"))]
mod memory;
pub mod models;
mod repository;
mod store;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use repository::Repository;
pub use store::{
    CaseStore, ClientContact, EntitlementStore, IntakeStore, NewCase, PortalStore,
};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Primary connection plus an optional read replica
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

async fn connect(url: &str, config: &DatabaseConfig, role: &str) -> Result<DatabaseConnection> {
    info!(role, "Connecting to database");

    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect to {}: {}", role, e),
        })
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let primary = connect(&config.url, config, "primary").await?;

        let replica = match config.read_url {
            Some(ref read_url) => Some(connect(read_url, config, "replica").await?),
            None => None,
        };

        info!(replica = replica.is_some(), "Database connections established");
        Ok(Self { primary, replica })
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping every configured connection
    pub async fn ping(&self) -> Result<()> {
        let targets = std::iter::once(("primary", &self.primary))
            .chain(self.replica.iter().map(|r| ("replica", r)));

        for (role, conn) in targets {
            conn.execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("{} ping failed: {}", role, e),
                })?;
        }

        Ok(())
    }
}
