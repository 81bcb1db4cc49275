//! Durable record of enforcement events and the actions taken on them.
//!
//! Source of truth for deduplication and audit. Status transitions are
//! monotonic and terminal: `Pending -> Accepted | Dismissed` by peer decision,
//! `UnderReview -> Accepted | Rejected` by a privileged reviewer. Every
//! transition appends an immutable [`ActionRecord`]; records are never
//! mutated or removed except when their origin node is deleted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::database::pool::DatabasePool;
use crate::error::{FederationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Accepted,
    Dismissed,
    UnderReview,
    Rejected,
}

impl EventStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStatus::Accepted | EventStatus::Dismissed | EventStatus::Rejected
        )
    }
}

/// One reported ban, propagated through the federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementEvent {
    /// Monotonic, assigned at creation, immutable
    pub id: i64,
    /// The identity the action targets
    pub subject_id: String,
    pub origin_node_id: String,
    pub reporter_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: EventStatus,
}

/// Append-only log entry for a decision taken on an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub event_id: i64,
    /// The status the decision produced
    pub action: EventStatus,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Actor recorded for automatic (non-human) decisions.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Default)]
struct EventState {
    next_id: i64,
    events: HashMap<i64, EnforcementEvent>,
    actions: Vec<ActionRecord>,
}

/// In-memory event store with write-through Postgres mirroring.
pub struct EventStore {
    state: RwLock<EventState>,
    db: Option<Arc<DatabasePool>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EventState::default()),
            db: None,
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Reload events and action records from the database mirror.
    pub async fn hydrate(&self) -> Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };

        let (events, actions) = db
            .events()
            .load_all()
            .await
            .map_err(FederationError::Storage)?;

        let mut state = self.state.write().await;
        state.next_id = events.iter().map(|e| e.id).max().unwrap_or(0);
        state.events = events.into_iter().map(|e| (e.id, e)).collect();
        state.actions = actions;
        Ok(())
    }

    /// Create an event atomically with its initial status.
    pub async fn create(
        &self,
        subject_id: &str,
        origin_node_id: &str,
        reporter_id: &str,
        reason: Option<String>,
        status: EventStatus,
        now: DateTime<Utc>,
    ) -> EnforcementEvent {
        let event = {
            let mut state = self.state.write().await;
            state.next_id += 1;
            let event = EnforcementEvent {
                id: state.next_id,
                subject_id: subject_id.to_string(),
                origin_node_id: origin_node_id.to_string(),
                reporter_id: reporter_id.to_string(),
                reason,
                created_at: now,
                status,
            };
            state.events.insert(event.id, event.clone());
            event
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.events().insert_event(&event).await {
                warn!(event_id = event.id, error = %e, "Failed to mirror event to database");
            }
        }

        event
    }

    /// Create an event unless one for this subject exists inside the window.
    ///
    /// The duplicate scan and the insert run under one write guard, so two
    /// simultaneous reports for the same subject produce exactly one event.
    pub async fn create_if_absent(
        &self,
        subject_id: &str,
        origin_node_id: &str,
        reporter_id: &str,
        reason: Option<String>,
        status: EventStatus,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<EnforcementEvent> {
        let event = {
            let mut state = self.state.write().await;
            let duplicate = state.events.values().any(|e| {
                e.subject_id == subject_id && now.signed_duration_since(e.created_at) < window
            });
            if duplicate {
                return None;
            }
            state.next_id += 1;
            let event = EnforcementEvent {
                id: state.next_id,
                subject_id: subject_id.to_string(),
                origin_node_id: origin_node_id.to_string(),
                reporter_id: reporter_id.to_string(),
                reason,
                created_at: now,
                status,
            };
            state.events.insert(event.id, event.clone());
            event
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.events().insert_event(&event).await {
                warn!(event_id = event.id, error = %e, "Failed to mirror event to database");
            }
        }

        Some(event)
    }

    /// True iff any event for this subject was created inside the window.
    ///
    /// The any-origin check subsumes the same-origin check, so one scan covers
    /// both dedup conditions. This is what breaks auto-act feedback loops: a
    /// peer's automatic ban re-reported within the window is a duplicate.
    pub async fn recent_exists(
        &self,
        subject_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let state = self.state.read().await;
        state
            .events
            .values()
            .any(|e| e.subject_id == subject_id && now.signed_duration_since(e.created_at) < window)
    }

    /// Atomic status transition with an appended action record.
    ///
    /// The check-then-set runs entirely inside one write guard, so concurrent
    /// duplicate resolutions see exactly one winner; later callers get
    /// [`FederationError::AlreadyResolved`].
    pub async fn try_transition(
        &self,
        event_id: i64,
        from: EventStatus,
        to: EventStatus,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<EnforcementEvent> {
        let (event, record) = {
            let mut state = self.state.write().await;
            let event = state
                .events
                .get_mut(&event_id)
                .ok_or(FederationError::UnknownEvent(event_id))?;

            if event.status != from {
                return Err(FederationError::AlreadyResolved {
                    event_id,
                    status: event.status,
                });
            }

            event.status = to;
            let event = event.clone();
            let record = ActionRecord {
                event_id,
                action: to,
                actor_id: actor_id.to_string(),
                timestamp: now,
            };
            state.actions.push(record.clone());
            (event, record)
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.events().update_status(event_id, to).await {
                warn!(event_id, error = %e, "Failed to mirror status transition");
            }
            if let Err(e) = db.events().insert_action(&record).await {
                warn!(event_id, error = %e, "Failed to mirror action record");
            }
        }

        Ok(event)
    }

    /// Record an automatic acceptance by one peer without changing the global
    /// status: the event stays `Pending` so other peers' manual decisions
    /// remain possible.
    pub async fn record_auto_accept(&self, event_id: i64, now: DateTime<Utc>) -> Result<()> {
        let record = {
            let mut state = self.state.write().await;
            if !state.events.contains_key(&event_id) {
                return Err(FederationError::UnknownEvent(event_id));
            }
            let record = ActionRecord {
                event_id,
                action: EventStatus::Accepted,
                actor_id: SYSTEM_ACTOR.to_string(),
                timestamp: now,
            };
            state.actions.push(record.clone());
            record
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.events().insert_action(&record).await {
                warn!(event_id, error = %e, "Failed to mirror auto-accept record");
            }
        }

        Ok(())
    }

    pub async fn get(&self, event_id: i64) -> Option<EnforcementEvent> {
        let state = self.state.read().await;
        state.events.get(&event_id).cloned()
    }

    /// Ban history for a subject, most recent first.
    pub async fn list_by_subject(&self, subject_id: &str) -> Vec<EnforcementEvent> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .values()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events
    }

    /// Events awaiting the privileged reviewer, most recent first.
    pub async fn list_under_review(&self) -> Vec<EnforcementEvent> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .values()
            .filter(|e| e.status == EventStatus::UnderReview)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events
    }

    pub async fn actions_for(&self, event_id: i64) -> Vec<ActionRecord> {
        let state = self.state.read().await;
        state
            .actions
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Cascade deletion when an origin node leaves the federation. Returns
    /// the number of events removed.
    pub async fn remove_origin(&self, origin_node_id: &str) -> usize {
        let removed_ids: Vec<i64> = {
            let mut state = self.state.write().await;
            let ids: Vec<i64> = state
                .events
                .values()
                .filter(|e| e.origin_node_id == origin_node_id)
                .map(|e| e.id)
                .collect();
            for id in &ids {
                state.events.remove(id);
            }
            state.actions.retain(|a| !ids.contains(&a.event_id));
            ids
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.events().delete_by_origin(origin_node_id).await {
                warn!(node_id = %origin_node_id, error = %e, "Failed to mirror origin cascade");
            }
        }

        removed_ids.len()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}
