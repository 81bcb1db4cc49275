//! Error taxonomy for the federation core.
//!
//! Admission denials (duplicates, rate limits) are not errors; they are
//! `IngestResult` variants. Errors here cover validation failures, resolution
//! conflicts, collaborator failures, and storage problems.

use thiserror::Error;

use crate::federation::events::EventStatus;

/// Result type alias for federation operations
pub type Result<T> = std::result::Result<T, FederationError>;

#[derive(Error, Debug)]
pub enum FederationError {
    /// Referenced node is not in the trust ledger
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Referenced enforcement event does not exist
    #[error("unknown event: {0}")]
    UnknownEvent(i64),

    /// Referenced risk alert does not exist
    #[error("unknown alert: {0}")]
    UnknownAlert(String),

    /// The event was already resolved; the second caller gets this as a
    /// reported no-op, the first caller's decision stands
    #[error("event {event_id} already resolved as {status:?}")]
    AlreadyResolved { event_id: i64, status: EventStatus },

    /// The risk alert was already resolved
    #[error("alert {0} already resolved")]
    AlertAlreadyResolved(String),

    /// The platform enforcement action (kick/ban) failed
    #[error("enforcement failed on node {node_id}: {reason}")]
    Enforcement { node_id: String, reason: String },

    /// A notification could not be delivered; isolated per peer, never
    /// affects event or ledger state
    #[error("delivery failed to {destination}: {reason}")]
    Delivery { destination: String, reason: String },

    /// Durable storage operation failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Rejected configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
