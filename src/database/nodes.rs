//! Node Repository - Database operations for the trust ledger
//!
//! Node records are mirrored write-through: the in-memory ledger is the
//! runtime source of truth, this table is the durability layer hydrated at
//! startup. Blocked peers and configuration are stored as JSONB.

use sqlx::postgres::PgPool;
use sqlx::Row;
use chrono::{DateTime, Utc};
use tracing::error;

use crate::federation::ledger::{NodeRecord, RiskConfig, RoutingConfig};

pub struct NodeRepository {
    pool: PgPool,
}

impl NodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS banlink.nodes (
                node_id VARCHAR(255) PRIMARY KEY,
                reliability SMALLINT NOT NULL DEFAULT 100,
                blacklisted BOOLEAN NOT NULL DEFAULT FALSE,
                blocked_peers JSONB NOT NULL DEFAULT '[]',
                routing JSONB NOT NULL DEFAULT '{}',
                risk JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create nodes table: {}", e))?;

        Ok(())
    }

    pub async fn upsert(&self, record: &NodeRecord) -> Result<(), String> {
        let blocked_peers = serde_json::to_value(&record.blocked_peers)
            .map_err(|e| format!("Failed to serialize blocked peers: {}", e))?;
        let routing = serde_json::to_value(&record.routing)
            .map_err(|e| format!("Failed to serialize routing config: {}", e))?;
        let risk = serde_json::to_value(&record.risk)
            .map_err(|e| format!("Failed to serialize risk config: {}", e))?;

        sqlx::query(r#"
            INSERT INTO banlink.nodes (node_id, reliability, blacklisted, blocked_peers, routing, risk, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (node_id) DO UPDATE SET
                reliability = EXCLUDED.reliability,
                blacklisted = EXCLUDED.blacklisted,
                blocked_peers = EXCLUDED.blocked_peers,
                routing = EXCLUDED.routing,
                risk = EXCLUDED.risk
        "#)
        .bind(&record.id)
        .bind(record.reliability as i16)
        .bind(record.blacklisted)
        .bind(blocked_peers)
        .bind(routing)
        .bind(risk)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to upsert node: {}", e))?;

        Ok(())
    }

    pub async fn delete(&self, node_id: &str) -> Result<(), String> {
        sqlx::query("DELETE FROM banlink.nodes WHERE node_id = $1")
            .bind(node_id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to delete node: {}", e))?;

        Ok(())
    }

    pub async fn load_all(&self) -> Result<Vec<NodeRecord>, String> {
        let rows = sqlx::query(r#"
            SELECT node_id, reliability, blacklisted, blocked_peers, routing, risk, created_at
            FROM banlink.nodes
        "#)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load nodes: {}", e))?;

        let mut records = Vec::new();
        for row in rows {
            let node_id: String = row.get("node_id");
            let reliability: i16 = row.get("reliability");
            let created_at: DateTime<Utc> = row.get("created_at");

            let blocked_peers = match serde_json::from_value(row.get("blocked_peers")) {
                Ok(peers) => peers,
                Err(e) => {
                    error!("Corrupt blocked_peers for node {}: {}", node_id, e);
                    continue;
                }
            };
            let routing: RoutingConfig = match serde_json::from_value(row.get("routing")) {
                Ok(routing) => routing,
                Err(e) => {
                    error!("Corrupt routing config for node {}: {}", node_id, e);
                    continue;
                }
            };
            let risk: RiskConfig = match serde_json::from_value(row.get("risk")) {
                Ok(risk) => risk,
                Err(e) => {
                    error!("Corrupt risk config for node {}: {}", node_id, e);
                    continue;
                }
            };

            records.push(NodeRecord {
                id: node_id,
                reliability: reliability.clamp(0, 100) as u8,
                blacklisted: row.get("blacklisted"),
                blocked_peers,
                routing,
                risk,
                created_at,
            });
        }

        Ok(records)
    }
}
