//! Storage layer for farm, node and power records.
//!
//! This module provides:
//! - The [`Store`] contract the managers and the worker read and write through
//! - [`MemoryStore`], the default in-process backend
//! - [`PgStore`], a Postgres backend with JSONB bodies
//!
//! Every read returns a whole record and every write replaces one. There are
//! no partial updates; callers serialize read-modify-write cycles through the
//! fleet gate.

mod error;
mod memory;
mod postgres;

pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::time::Duration;

use async_trait::async_trait;
use farmerbot_id::NodeId;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::document::FarmerbotConfig;
use crate::models::{Farm, Node, Power, PowerState};

/// Persistent state of the bot.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_farm(&self) -> Result<Farm, DbError>;

    async fn set_farm(&self, farm: &Farm) -> Result<(), DbError>;

    /// The power policy, or the default policy when none was configured.
    async fn get_power(&self) -> Result<Power, DbError>;

    async fn set_power(&self, power: &Power) -> Result<(), DbError>;

    async fn get_node(&self, id: NodeId) -> Result<Node, DbError>;

    /// All nodes in definition order.
    async fn get_nodes(&self) -> Result<Vec<Node>, DbError>;

    /// Insert or replace one node. A replaced node keeps its position.
    async fn update_node(&self, node: &Node) -> Result<(), DbError>;

    /// Replace the whole node set.
    async fn set_nodes(&self, nodes: &[Node]) -> Result<(), DbError>;

    /// Seed the store from a configuration document.
    async fn save_config(&self, config: &FarmerbotConfig) -> Result<(), DbError> {
        self.set_farm(&config.farm).await?;
        self.set_nodes(&config.nodes).await?;
        self.set_power(&config.power).await
    }

    async fn filter_on_nodes(&self) -> Result<Vec<Node>, DbError> {
        let nodes = self.get_nodes().await?;
        Ok(nodes
            .into_iter()
            .filter(|n| n.power_state == PowerState::On)
            .collect())
    }

    /// Check the backend is reachable.
    async fn health_check(&self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL.
    pub database_url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Minimum number of idle connections.
    pub min_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/farmerbot".to_string(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/farmerbot".to_string());

        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Self {
            database_url,
            max_connections,
            ..Default::default()
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(DbError::Connect)?;

        info!("Database connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        info!("Running database migrations");

        let candidates = vec![
            std::path::PathBuf::from("./migrations"),
            std::path::PathBuf::from("services/farmerbot/migrations"),
            std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
        ];
        let mut last_error: Option<sqlx::migrate::MigrateError> = None;

        for dir in &candidates {
            match sqlx::migrate::Migrator::new(dir.clone()).await {
                Ok(migrator) => {
                    info!(migrations_dir = %dir.display(), "Loaded migrations");
                    migrator.run(&self.pool).await.map_err(DbError::Migration)?;
                    info!("Database migrations complete");
                    return Ok(());
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        let tried = candidates
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Err(DbError::MigrationDirNotFound {
            tried,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// A store backed by this pool.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.min_connections, 1);
    }
}
