//! Risk Repository - Database operations for the alt risk engine
//!
//! Dismissals are the only risk state that must survive a restart; the
//! action log is an append-only audit trail.

use sqlx::postgres::PgPool;
use sqlx::Row;
use chrono::{DateTime, Utc};

use crate::risk::monitor::{DismissalEntry, RiskActionKind, RiskActionRecord};

pub struct RiskRepository {
    pool: PgPool,
}

fn action_to_str(action: RiskActionKind) -> &'static str {
    match action {
        RiskActionKind::AutoKicked => "auto-kicked",
        RiskActionKind::AutoBanned => "auto-banned",
        RiskActionKind::Kicked => "kicked",
        RiskActionKind::Banned => "banned",
        RiskActionKind::Dismissed => "dismissed",
    }
}

impl RiskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS banlink.dismissals (
                node_id VARCHAR(255) NOT NULL,
                identity_id VARCHAR(255) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                PRIMARY KEY (node_id, identity_id)
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create dismissals table: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS banlink.risk_actions (
                id SERIAL PRIMARY KEY,
                node_id VARCHAR(255) NOT NULL,
                identity_id VARCHAR(255) NOT NULL,
                action VARCHAR(32) NOT NULL,
                actor_id VARCHAR(255) NOT NULL,
                acted_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create risk_actions table: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_risk_actions_node ON banlink.risk_actions(node_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create risk_actions index: {}", e))?;

        Ok(())
    }

    pub async fn insert_dismissal(&self, entry: &DismissalEntry) -> Result<(), String> {
        sqlx::query(r#"
            INSERT INTO banlink.dismissals (node_id, identity_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (node_id, identity_id) DO NOTHING
        "#)
        .bind(&entry.node_id)
        .bind(&entry.identity_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert dismissal: {}", e))?;

        Ok(())
    }

    pub async fn delete_dismissal(&self, node_id: &str, identity_id: &str) -> Result<(), String> {
        sqlx::query("DELETE FROM banlink.dismissals WHERE node_id = $1 AND identity_id = $2")
            .bind(node_id)
            .bind(identity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to delete dismissal: {}", e))?;

        Ok(())
    }

    pub async fn load_dismissals(&self) -> Result<Vec<DismissalEntry>, String> {
        let rows = sqlx::query("SELECT node_id, identity_id, created_at FROM banlink.dismissals")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to load dismissals: {}", e))?;

        let mut entries = Vec::new();
        for row in rows {
            let created_at: DateTime<Utc> = row.get("created_at");
            entries.push(DismissalEntry {
                node_id: row.get("node_id"),
                identity_id: row.get("identity_id"),
                created_at,
            });
        }

        Ok(entries)
    }

    pub async fn insert_action(&self, record: &RiskActionRecord) -> Result<(), String> {
        sqlx::query(r#"
            INSERT INTO banlink.risk_actions (node_id, identity_id, action, actor_id, acted_at)
            VALUES ($1, $2, $3, $4, $5)
        "#)
        .bind(&record.node_id)
        .bind(&record.identity_id)
        .bind(action_to_str(record.action))
        .bind(&record.actor_id)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert risk action: {}", e))?;

        Ok(())
    }
}
