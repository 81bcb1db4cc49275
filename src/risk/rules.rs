//! Heuristic rules for flagging likely alt identities.
//!
//! Each rule contributes a fixed weight when it triggers; the scorer sums
//! the weights of enabled, triggered rules. Weights are signal strength,
//! not probabilities.

use serde::{Deserialize, Serialize};

/// Signals that mark a joining identity as a likely alt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskRule {
    /// Account younger than seven days
    NewAccount,

    /// No custom avatar set
    NoAvatar,

    /// Handle or display name contains "alt"
    AltName,

    /// Auto-generated handle shape, letters followed by four digits
    DefaultName,

    /// A prior enforcement record exists for this identity
    PreviousBan,

    /// Another identity joined the same node moments earlier
    QuickJoin,
}

impl RiskRule {
    pub const ALL: [RiskRule; 6] = [
        RiskRule::NewAccount,
        RiskRule::NoAvatar,
        RiskRule::AltName,
        RiskRule::DefaultName,
        RiskRule::PreviousBan,
        RiskRule::QuickJoin,
    ];

    /// Score contribution when the rule triggers
    pub fn weight(&self) -> u32 {
        match self {
            RiskRule::NewAccount => 50,
            RiskRule::NoAvatar => 30,
            RiskRule::AltName => 30,
            RiskRule::DefaultName => 20,
            RiskRule::PreviousBan => 40,
            RiskRule::QuickJoin => 25,
        }
    }

    /// Human-readable description for alerts
    pub fn description(&self) -> &'static str {
        match self {
            RiskRule::NewAccount => "Account created less than 7 days ago",
            RiskRule::NoAvatar => "No custom avatar",
            RiskRule::AltName => "Name contains 'alt'",
            RiskRule::DefaultName => "Auto-generated default name shape",
            RiskRule::PreviousBan => "Previously banned identity",
            RiskRule::QuickJoin => "Joined moments after another identity",
        }
    }
}
