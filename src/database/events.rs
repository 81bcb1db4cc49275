//! Event Repository - Database operations for enforcement events
//!
//! Events carry their in-memory ids; the action log is append-only.

use sqlx::postgres::PgPool;
use sqlx::Row;
use chrono::{DateTime, Utc};
use tracing::error;

use crate::federation::events::{ActionRecord, EnforcementEvent, EventStatus};

pub struct EventRepository {
    pool: PgPool,
}

fn status_to_str(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Pending => "Pending",
        EventStatus::Accepted => "Accepted",
        EventStatus::Dismissed => "Dismissed",
        EventStatus::UnderReview => "UnderReview",
        EventStatus::Rejected => "Rejected",
    }
}

fn status_from_str(status: &str) -> Option<EventStatus> {
    match status {
        "Pending" => Some(EventStatus::Pending),
        "Accepted" => Some(EventStatus::Accepted),
        "Dismissed" => Some(EventStatus::Dismissed),
        "UnderReview" => Some(EventStatus::UnderReview),
        "Rejected" => Some(EventStatus::Rejected),
        _ => None,
    }
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), String> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS banlink.events (
                id BIGINT PRIMARY KEY,
                subject_id VARCHAR(255) NOT NULL,
                origin_node_id VARCHAR(255) NOT NULL,
                reporter_id VARCHAR(255) NOT NULL,
                reason TEXT,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                status VARCHAR(32) NOT NULL
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create events table: {}", e))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS banlink.event_actions (
                id SERIAL PRIMARY KEY,
                event_id BIGINT NOT NULL,
                action VARCHAR(32) NOT NULL,
                actor_id VARCHAR(255) NOT NULL,
                acted_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create event_actions table: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_subject ON banlink.events(subject_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create events subject index: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_origin ON banlink.events(origin_node_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create events origin index: {}", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_actions_event ON banlink.event_actions(event_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create event_actions index: {}", e))?;

        Ok(())
    }

    pub async fn insert_event(&self, event: &EnforcementEvent) -> Result<(), String> {
        sqlx::query(r#"
            INSERT INTO banlink.events (id, subject_id, origin_node_id, reporter_id, reason, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#)
        .bind(event.id)
        .bind(&event.subject_id)
        .bind(&event.origin_node_id)
        .bind(&event.reporter_id)
        .bind(&event.reason)
        .bind(event.created_at)
        .bind(status_to_str(event.status))
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert event: {}", e))?;

        Ok(())
    }

    pub async fn update_status(&self, event_id: i64, status: EventStatus) -> Result<(), String> {
        sqlx::query("UPDATE banlink.events SET status = $2 WHERE id = $1")
            .bind(event_id)
            .bind(status_to_str(status))
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to update event status: {}", e))?;

        Ok(())
    }

    pub async fn insert_action(&self, record: &ActionRecord) -> Result<(), String> {
        sqlx::query(r#"
            INSERT INTO banlink.event_actions (event_id, action, actor_id, acted_at)
            VALUES ($1, $2, $3, $4)
        "#)
        .bind(record.event_id)
        .bind(status_to_str(record.action))
        .bind(&record.actor_id)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to insert action record: {}", e))?;

        Ok(())
    }

    pub async fn delete_by_origin(&self, origin_node_id: &str) -> Result<u64, String> {
        sqlx::query(r#"
            DELETE FROM banlink.event_actions
            WHERE event_id IN (SELECT id FROM banlink.events WHERE origin_node_id = $1)
        "#)
        .bind(origin_node_id)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to delete action records: {}", e))?;

        let result = sqlx::query("DELETE FROM banlink.events WHERE origin_node_id = $1")
            .bind(origin_node_id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to delete events: {}", e))?;

        Ok(result.rows_affected())
    }

    pub async fn load_all(&self) -> Result<(Vec<EnforcementEvent>, Vec<ActionRecord>), String> {
        let rows = sqlx::query(r#"
            SELECT id, subject_id, origin_node_id, reporter_id, reason, created_at, status
            FROM banlink.events
        "#)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load events: {}", e))?;

        let mut events = Vec::new();
        for row in rows {
            let status_str: String = row.get("status");
            let status = match status_from_str(&status_str) {
                Some(status) => status,
                None => {
                    error!("Unknown event status: {}", status_str);
                    continue;
                }
            };

            events.push(EnforcementEvent {
                id: row.get("id"),
                subject_id: row.get("subject_id"),
                origin_node_id: row.get("origin_node_id"),
                reporter_id: row.get("reporter_id"),
                reason: row.get("reason"),
                created_at: row.get("created_at"),
                status,
            });
        }

        let rows = sqlx::query(r#"
            SELECT event_id, action, actor_id, acted_at
            FROM banlink.event_actions
            ORDER BY id
        "#)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load action records: {}", e))?;

        let mut actions = Vec::new();
        for row in rows {
            let action_str: String = row.get("action");
            let action = match status_from_str(&action_str) {
                Some(action) => action,
                None => {
                    error!("Unknown action status: {}", action_str);
                    continue;
                }
            };

            let timestamp: DateTime<Utc> = row.get("acted_at");
            actions.push(ActionRecord {
                event_id: row.get("event_id"),
                action,
                actor_id: row.get("actor_id"),
                timestamp,
            });
        }

        Ok((events, actions))
    }
}
