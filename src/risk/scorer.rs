//! Deterministic risk scoring of a joining identity.
//!
//! Pure function of the identity profile, the join context, and the node's
//! rule toggles at a fixed instant. Same inputs, same score.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::federation::ledger::RuleToggles;
use crate::risk::rules::RiskRule;

pub const NEW_ACCOUNT_MAX_AGE_DAYS: i64 = 7;

/// Platform-level facts about the identity at join time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub identity_id: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub has_avatar: bool,
}

/// Join-time context the scorer cannot derive from the profile alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinContext {
    /// Another identity joined the same node inside the quick-join horizon
    pub quick_join: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub rule: RiskRule,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub total: u32,
    pub triggered: Vec<TriggeredRule>,
}

impl ScoreResult {
    pub fn rule_triggered(&self, rule: RiskRule) -> bool {
        self.triggered.iter().any(|t| t.rule == rule)
    }
}

/// Score an identity against the node's enabled rules.
pub fn evaluate(
    identity: &IdentityProfile,
    ctx: &JoinContext,
    toggles: &RuleToggles,
    now: DateTime<Utc>,
) -> ScoreResult {
    let mut triggered = Vec::new();
    let mut push = |rule: RiskRule| {
        triggered.push(TriggeredRule {
            rule,
            weight: rule.weight(),
        });
    };

    if toggles.new_account
        && now.signed_duration_since(identity.created_at)
            < Duration::days(NEW_ACCOUNT_MAX_AGE_DAYS)
    {
        push(RiskRule::NewAccount);
    }
    if toggles.no_avatar && !identity.has_avatar {
        push(RiskRule::NoAvatar);
    }
    if toggles.alt_name && contains_alt(identity) {
        push(RiskRule::AltName);
    }
    if toggles.default_name && has_default_name_shape(&identity.handle) {
        push(RiskRule::DefaultName);
    }
    if toggles.previous_ban && has_previous_ban(&identity.identity_id) {
        push(RiskRule::PreviousBan);
    }
    if toggles.quick_join && ctx.quick_join {
        push(RiskRule::QuickJoin);
    }

    let total = triggered.iter().map(|t| t.weight).sum();
    ScoreResult { total, triggered }
}

fn contains_alt(identity: &IdentityProfile) -> bool {
    let in_handle = identity.handle.to_lowercase().contains("alt");
    let in_display = identity
        .display_name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains("alt"));
    in_handle || in_display
}

/// Auto-generated handle shape: one or more letters followed by exactly
/// four digits, nothing else.
fn has_default_name_shape(handle: &str) -> bool {
    let chars: Vec<char> = handle.chars().collect();
    if chars.len() < 5 {
        return false;
    }
    let (letters, digits) = chars.split_at(chars.len() - 4);
    letters.iter().all(|c| c.is_ascii_alphabetic())
        && digits.iter().all(|c| c.is_ascii_digit())
}

// TODO: wire the federation enforcement history into this signal
fn has_previous_ban(_identity_id: &str) -> bool {
    false
}
