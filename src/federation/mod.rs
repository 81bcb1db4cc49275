//! Ban propagation across federated moderation nodes.

pub mod coordinator;
pub mod events;
pub mod ledger;
pub mod rate_limit;

pub use coordinator::{BanReport, IngestResult, PropagationCoordinator, Resolution};
pub use events::{ActionRecord, EnforcementEvent, EventStatus, EventStore};
pub use ledger::{NodeRecord, RiskConfig, RoutingConfig, RuleToggles, TrustLedger};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
