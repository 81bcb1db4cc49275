//! Heuristic alt-identity risk engine.

pub mod joins;
pub mod monitor;
pub mod rules;
pub mod scorer;

pub use joins::JoinWindowTracker;
pub use monitor::{
    AlertAction, DismissalEntry, JoinOutcome, RiskActionKind, RiskActionRecord, RiskAlert,
    RiskMonitor,
};
pub use rules::RiskRule;
pub use scorer::{IdentityProfile, JoinContext, ScoreResult, TriggeredRule};
