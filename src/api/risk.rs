//! Risk API Endpoints
//!
//! Identity-join evaluation, alert resolution, dismissal management, and
//! the risk action log.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::{error_response, ApiState};
use crate::risk::monitor::{AlertAction, JoinOutcome, RiskAlert};
use crate::risk::scorer::{IdentityProfile, ScoreResult};

// Response types

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub outcome: String,
    pub score: Option<u32>,
    pub triggered: Vec<String>,
    pub alert_id: Option<String>,
    pub action: Option<String>,
    /// True when the joining identity has an accepted ban on record and the
    /// node was sent a rejoin alert
    pub banned_rejoin: bool,
}

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub id: String,
    pub node_id: String,
    pub identity_id: String,
    pub handle: String,
    pub score: u32,
    pub triggered: Vec<String>,
    pub created_at: String,
    pub resolution: Option<String>,
}

impl From<RiskAlert> for AlertResponse {
    fn from(alert: RiskAlert) -> Self {
        Self {
            id: alert.id,
            node_id: alert.node_id,
            identity_id: alert.identity.identity_id,
            handle: alert.identity.handle,
            score: alert.score.total,
            triggered: rule_names(&alert.score),
            created_at: alert.created_at.to_rfc3339(),
            resolution: alert.resolution.map(|r| format!("{:?}", r.action)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActionLogResponse {
    pub node_id: String,
    pub total: usize,
    pub actions: Vec<ActionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ActionSummary {
    pub identity_id: String,
    pub action: String,
    pub actor_id: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub node_id: String,
    pub identity: IdentityProfile,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAlertRequest {
    pub action: AlertAction,
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NodeQuery {
    pub node_id: String,
}

fn rule_names(score: &ScoreResult) -> Vec<String> {
    score
        .triggered
        .iter()
        .map(|t| t.rule.description().to_string())
        .collect()
}

// Endpoints

/// POST /joins - Evaluate an identity join
pub async fn identity_join(
    State(state): State<ApiState>,
    Json(payload): Json<JoinRequest>,
) -> Json<JoinResponse> {
    let identity_id = payload.identity.identity_id.clone();
    let outcome = state
        .monitor
        .on_identity_join(&payload.node_id, payload.identity)
        .await;
    let banned_rejoin = state
        .coordinator
        .notify_banned_rejoin(&payload.node_id, &identity_id)
        .await;

    let response = match outcome {
        JoinOutcome::Disabled => JoinResponse {
            outcome: "disabled".to_string(),
            score: None,
            triggered: vec![],
            alert_id: None,
            action: None,
            banned_rejoin,
        },
        JoinOutcome::Suppressed => JoinResponse {
            outcome: "suppressed".to_string(),
            score: None,
            triggered: vec![],
            alert_id: None,
            action: None,
            banned_rejoin,
        },
        JoinOutcome::BelowThreshold { score } => JoinResponse {
            outcome: "below_threshold".to_string(),
            score: Some(score.total),
            triggered: rule_names(&score),
            alert_id: None,
            action: None,
            banned_rejoin,
        },
        JoinOutcome::Unrouted { score } => JoinResponse {
            outcome: "unrouted".to_string(),
            score: Some(score.total),
            triggered: rule_names(&score),
            alert_id: None,
            action: None,
            banned_rejoin,
        },
        JoinOutcome::AutoActed { action, score } => JoinResponse {
            outcome: "auto_acted".to_string(),
            score: Some(score.total),
            triggered: rule_names(&score),
            alert_id: None,
            action: Some(format!("{:?}", action)),
            banned_rejoin,
        },
        JoinOutcome::Alerted { alert_id, score } => JoinResponse {
            outcome: "alerted".to_string(),
            score: Some(score.total),
            triggered: rule_names(&score),
            alert_id: Some(alert_id),
            action: None,
            banned_rejoin,
        },
    };
    Json(response)
}

/// POST /alerts/:id/resolve - Reviewer decision on a pending alert
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(alert_id): Path<String>,
    Json(payload): Json<ResolveAlertRequest>,
) -> Result<Json<AlertResponse>, (StatusCode, String)> {
    let alert = state
        .monitor
        .resolve_alert(&alert_id, payload.action, &payload.actor_id)
        .await
        .map_err(error_response)?;
    Ok(Json(alert.into()))
}

/// GET /alerts/pending?node_id= - Unresolved alerts for a node
pub async fn pending_alerts(
    State(state): State<ApiState>,
    Query(query): Query<NodeQuery>,
) -> Json<Vec<AlertResponse>> {
    let alerts = state.monitor.pending_alerts(&query.node_id).await;
    Json(alerts.into_iter().map(Into::into).collect())
}

/// GET /actions/:node_id - Risk action log for a node
pub async fn action_log(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Json<ActionLogResponse> {
    let actions = state.monitor.actions_for(&node_id).await;
    Json(ActionLogResponse {
        node_id,
        total: actions.len(),
        actions: actions
            .into_iter()
            .map(|r| ActionSummary {
                identity_id: r.identity_id,
                action: format!("{:?}", r.action),
                actor_id: r.actor_id,
                timestamp: r.timestamp.to_rfc3339(),
            })
            .collect(),
    })
}

/// DELETE /dismissals/:node_id/:identity_id - Lift a permanent dismissal
pub async fn clear_dismissal(
    State(state): State<ApiState>,
    Path((node_id, identity_id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.monitor.clear_dismissal(&node_id, &identity_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Dismissal not found".to_string()))
    }
}

/// Create the risk API router
pub fn create_risk_router(state: ApiState) -> Router {
    Router::new()
        .route("/joins", post(identity_join))
        .route("/alerts/{id}/resolve", post(resolve_alert))
        .route("/alerts/pending", get(pending_alerts))
        .route("/actions/{node_id}", get(action_log))
        .route(
            "/dismissals/{node_id}/{identity_id}",
            delete(clear_dismissal),
        )
        .with_state(state)
}
