//! HTTP API endpoints for the banlink federation service
//!
//! Provides REST APIs for:
//! - Federation (ban report ingest, resolution, review, history)
//! - Risk (identity-join evaluation, alert resolution, dismissals)
//! - Nodes (registration, configuration, striking, removal)

pub mod federation;
pub mod nodes;
pub mod risk;

use axum::http::StatusCode;
use std::sync::Arc;

use crate::error::FederationError;
use crate::federation::coordinator::PropagationCoordinator;
use crate::risk::monitor::RiskMonitor;

pub use federation::create_federation_router;
pub use nodes::create_node_router;
pub use risk::create_risk_router;

/// Shared state for all API routers
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<PropagationCoordinator>,
    pub monitor: Arc<RiskMonitor>,
}

/// Map domain errors to HTTP responses.
pub fn error_response(err: FederationError) -> (StatusCode, String) {
    let status = match &err {
        FederationError::UnknownNode(_)
        | FederationError::UnknownEvent(_)
        | FederationError::UnknownAlert(_) => StatusCode::NOT_FOUND,
        FederationError::AlreadyResolved { .. } | FederationError::AlertAlreadyResolved(_) => {
            StatusCode::CONFLICT
        }
        FederationError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        FederationError::Enforcement { .. } | FederationError::Delivery { .. } => {
            StatusCode::BAD_GATEWAY
        }
        FederationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
