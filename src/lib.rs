//! Banlink Federation Service
//!
//! Cross-node ban propagation with a trust ledger, plus a heuristic risk
//! engine that scores joining identities for likely alt accounts.
//!
//! ## Module Structure
//!
//! ```text
//! banlink/src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Domain error type
//! ├── outbound.rs    - Notifier/Enforcer traits & webhook impls
//! ├── federation/    - Ban propagation system
//! │   ├── ledger.rs      - Per-node trust ledger
//! │   ├── events.rs      - Enforcement events & action log
//! │   ├── rate_limit.rs  - Per-origin sliding-window rate limiter
//! │   └── coordinator.rs - Ingest/resolve pipeline & fan-out
//! ├── risk/          - Alt-identity risk engine
//! │   ├── rules.rs   - Heuristic rules & weights
//! │   ├── scorer.rs  - Deterministic scoring
//! │   ├── joins.rs   - Recent-join window (quick-join signal)
//! │   └── monitor.rs - Join-time decision policy & alerts
//! ├── api/           - HTTP API endpoints
//! │   ├── federation.rs - Ingest, resolve, review, history
//! │   ├── risk.rs       - Joins, alerts, dismissals, action log
//! │   └── nodes.rs      - Node configuration & lifecycle
//! └── database/      - PostgreSQL persistence (write-through mirror)
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod federation;
pub mod outbound;
pub mod risk;

// Re-export main types for convenience
pub use config::BanlinkConfig;
pub use database::pool::DatabasePool;
pub use error::{FederationError, Result};
pub use federation::{
    BanReport, EnforcementEvent, EventStatus, EventStore, IngestResult, NodeRecord,
    PropagationCoordinator, RateLimiter, RateLimiterConfig, Resolution, RiskConfig, RoutingConfig,
    RuleToggles, TrustLedger,
};
pub use outbound::{
    AlertKind, Decision, DecisionRequest, EnforceAction, Enforcer, Notification, Notifier,
    WebhookEnforcer, WebhookNotifier,
};
pub use risk::{
    AlertAction, IdentityProfile, JoinOutcome, JoinWindowTracker, RiskActionKind, RiskAlert,
    RiskMonitor, RiskRule, ScoreResult,
};

// Re-export API types
pub use api::{create_federation_router, create_node_router, create_risk_router, ApiState};
