//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::database::events::EventRepository;
use crate::database::nodes::NodeRepository;
use crate::database::risk::RiskRepository;

pub struct DatabasePool {
    pool: PgPool,
    nodes: NodeRepository,
    events: EventRepository,
    risk: RiskRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str) -> Result<Self, String> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| format!("Failed to connect to PostgreSQL: {}", e))?;

        info!("Connected to PostgreSQL");

        let nodes = NodeRepository::new(pool.clone());
        let events = EventRepository::new(pool.clone());
        let risk = RiskRepository::new(pool.clone());

        Ok(Self {
            pool,
            nodes,
            events,
            risk,
        })
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        info!("Initializing database schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS banlink")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create banlink schema: {}", e))?;

        self.nodes.init_schema().await?;
        self.events.init_schema().await?;
        self.risk.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn nodes(&self) -> &NodeRepository {
        &self.nodes
    }

    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    pub fn risk(&self) -> &RiskRepository {
        &self.risk
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
