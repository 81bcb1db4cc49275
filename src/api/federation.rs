//! Federation API Endpoints
//!
//! Ban report ingest, resolution, review flow, and subject history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::{error_response, ApiState};
use crate::federation::coordinator::{BanReport, IngestResult, Resolution};
use crate::federation::events::EnforcementEvent;

// Response types

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub outcome: String,
    pub event_id: Option<i64>,
    pub auto_acted: Vec<String>,
    pub alerted: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: i64,
    pub subject_id: String,
    pub origin_node_id: String,
    pub reporter_id: String,
    pub reason: Option<String>,
    pub created_at: String,
    pub status: String,
}

impl From<EnforcementEvent> for EventResponse {
    fn from(event: EnforcementEvent) -> Self {
        Self {
            id: event.id,
            subject_id: event.subject_id,
            origin_node_id: event.origin_node_id,
            reporter_id: event.reporter_id,
            reason: event.reason,
            created_at: event.created_at.to_rfc3339(),
            status: format!("{:?}", event.status),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventHistoryResponse {
    pub subject_id: String,
    pub total: usize,
    pub events: Vec<EventResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: Resolution,
    pub actor_id: String,
    /// When set on Accept, the subject is also banned on this node
    pub acting_node: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approve: bool,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub subject_id: String,
    pub origin_node_id: String,
    pub reporter_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub subject: String,
}

// Endpoints

/// POST /events - Ingest a ban report and propagate it
pub async fn ingest_event(
    State(state): State<ApiState>,
    Json(report): Json<BanReport>,
) -> Json<IngestResponse> {
    let response = match state.coordinator.ingest(report).await {
        IngestResult::Duplicate => IngestResponse {
            outcome: "duplicate".to_string(),
            event_id: None,
            auto_acted: vec![],
            alerted: vec![],
        },
        IngestResult::UnknownOrigin => IngestResponse {
            outcome: "unknown_origin".to_string(),
            event_id: None,
            auto_acted: vec![],
            alerted: vec![],
        },
        IngestResult::OriginBlacklisted => IngestResponse {
            outcome: "origin_blacklisted".to_string(),
            event_id: None,
            auto_acted: vec![],
            alerted: vec![],
        },
        IngestResult::RateLimited => IngestResponse {
            outcome: "rate_limited".to_string(),
            event_id: None,
            auto_acted: vec![],
            alerted: vec![],
        },
        IngestResult::Propagated {
            event,
            auto_acted,
            alerted,
        } => IngestResponse {
            outcome: "propagated".to_string(),
            event_id: Some(event.id),
            auto_acted,
            alerted,
        },
    };
    Json(response)
}

/// POST /events/:id/resolve - Accept or dismiss a pending event
pub async fn resolve_event(
    State(state): State<ApiState>,
    Path(event_id): Path<i64>,
    Json(payload): Json<ResolveRequest>,
) -> Result<Json<EventResponse>, (StatusCode, String)> {
    let event = state
        .coordinator
        .resolve(
            event_id,
            payload.resolution,
            &payload.actor_id,
            payload.acting_node.as_deref(),
        )
        .await
        .map_err(error_response)?;
    Ok(Json(event.into()))
}

/// POST /events/:id/review - Privileged verdict on a flagged report
pub async fn resolve_review(
    State(state): State<ApiState>,
    Path(event_id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<EventResponse>, (StatusCode, String)> {
    let event = state
        .coordinator
        .resolve_review(event_id, payload.approve, &payload.actor_id)
        .await
        .map_err(error_response)?;
    Ok(Json(event.into()))
}

/// GET /events?subject= - Ban history for a subject
pub async fn event_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<EventHistoryResponse> {
    let events = state.coordinator.list_events(&query.subject).await;
    Json(EventHistoryResponse {
        subject_id: query.subject,
        total: events.len(),
        events: events.into_iter().map(Into::into).collect(),
    })
}

/// POST /flags - File a report for privileged review
pub async fn flag_report(
    State(state): State<ApiState>,
    Json(payload): Json<FlagRequest>,
) -> Json<EventResponse> {
    let event = state
        .coordinator
        .flag_for_review(
            &payload.subject_id,
            &payload.origin_node_id,
            &payload.reporter_id,
            payload.reason,
        )
        .await;
    Json(event.into())
}

/// GET /flags/pending - Reports awaiting the privileged reviewer
pub async fn pending_flags(State(state): State<ApiState>) -> Json<Vec<EventResponse>> {
    let events = state.coordinator.pending_reviews().await;
    Json(events.into_iter().map(Into::into).collect())
}

/// Create the federation API router
pub fn create_federation_router(state: ApiState) -> Router {
    Router::new()
        .route("/events", post(ingest_event).get(event_history))
        .route("/events/{id}/resolve", post(resolve_event))
        .route("/events/{id}/review", post(resolve_review))
        .route("/flags", post(flag_report))
        .route("/flags/pending", get(pending_flags))
        .with_state(state)
}
