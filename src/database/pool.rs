//! Database Connection Pool using sqlx

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::contributions::PgLedger;

pub struct DatabasePool {
    pool: PgPool,
    contributions: PgLedger,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.postgres_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        let contributions = PgLedger::new(pool.clone());

        Ok(Self {
            pool,
            contributions,
        })
    }

    pub async fn init_schema(&self) -> Result<()> {
        self.contributions
            .init_schema()
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    pub fn contributions(&self) -> &PgLedger {
        &self.contributions
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
