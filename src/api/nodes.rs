//! Node API Endpoints
//!
//! Node registration, routing and risk configuration, peer blocking,
//! striking, and removal.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::{error_response, ApiState};
use crate::federation::ledger::{NodeRecord, RiskUpdate, RoutingUpdate};

// Response types

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub id: String,
    pub reliability: u8,
    pub blacklisted: bool,
    pub blocked_peers: Vec<String>,
    pub alert_channel: Option<String>,
    pub ping_target: Option<String>,
    pub auto_ban: bool,
    pub risk_enabled: bool,
    pub risk_threshold: u32,
    pub risk_auto_kick: bool,
    pub risk_auto_ban: bool,
    pub created_at: String,
}

impl From<NodeRecord> for NodeResponse {
    fn from(record: NodeRecord) -> Self {
        let mut blocked_peers: Vec<String> = record.blocked_peers.into_iter().collect();
        blocked_peers.sort();
        Self {
            id: record.id,
            reliability: record.reliability,
            blacklisted: record.blacklisted,
            blocked_peers,
            alert_channel: record.routing.alert_channel,
            ping_target: record.routing.ping_target,
            auto_ban: record.routing.auto_ban,
            risk_enabled: record.risk.enabled,
            risk_threshold: record.risk.threshold,
            risk_auto_kick: record.risk.auto_kick,
            risk_auto_ban: record.risk.auto_ban,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    pub node_id: String,
    pub removed_events: usize,
}

// Endpoints

/// POST /nodes/:id - Register a node (idempotent)
pub async fn register_node(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Json<NodeResponse> {
    let record = state.coordinator.ledger().get_or_create(&node_id).await;
    Json(record.into())
}

/// GET /nodes/:id - Inspect a node
pub async fn get_node(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Result<Json<NodeResponse>, (StatusCode, String)> {
    match state.coordinator.ledger().get(&node_id).await {
        Some(record) => Ok(Json(record.into())),
        None => Err((StatusCode::NOT_FOUND, format!("Unknown node: {}", node_id))),
    }
}

/// PUT /nodes/:id/routing - Update alert routing
pub async fn update_routing(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
    Json(payload): Json<RoutingUpdate>,
) -> Result<Json<NodeResponse>, (StatusCode, String)> {
    let record = state
        .coordinator
        .ledger()
        .update_routing(&node_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(record.into()))
}

/// PUT /nodes/:id/risk - Update risk engine configuration
pub async fn update_risk(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
    Json(payload): Json<RiskUpdate>,
) -> Result<Json<NodeResponse>, (StatusCode, String)> {
    let record = state
        .coordinator
        .ledger()
        .update_risk(&node_id, payload)
        .await
        .map_err(error_response)?;
    Ok(Json(record.into()))
}

/// POST /nodes/:id/strike - Force-blacklist a node
pub async fn strike_node(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Json<NodeResponse> {
    let record = state.coordinator.strike_node(&node_id).await;
    Json(record.into())
}

/// POST /nodes/:id/blocked/:peer - Block a peer's reports
pub async fn block_peer(
    State(state): State<ApiState>,
    Path((node_id, peer_id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .coordinator
        .ledger()
        .block_peer(&node_id, &peer_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /nodes/:id/blocked/:peer - Unblock a peer
pub async fn unblock_peer(
    State(state): State<ApiState>,
    Path((node_id, peer_id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .coordinator
        .ledger()
        .unblock_peer(&node_id, &peer_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /nodes/:id - Remove a node and its originated events
pub async fn remove_node(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
) -> Result<Json<RemovalResponse>, (StatusCode, String)> {
    let removed_events = state
        .coordinator
        .remove_node(&node_id)
        .await
        .map_err(error_response)?;
    Ok(Json(RemovalResponse {
        node_id,
        removed_events,
    }))
}

/// Create the node API router
pub fn create_node_router(state: ApiState) -> Router {
    Router::new()
        .route("/{id}", post(register_node).get(get_node).delete(remove_node))
        .route("/{id}/routing", put(update_routing))
        .route("/{id}/risk", put(update_risk))
        .route("/{id}/strike", post(strike_node))
        .route(
            "/{id}/blocked/{peer}",
            post(block_peer).delete(unblock_peer),
        )
        .with_state(state)
}
