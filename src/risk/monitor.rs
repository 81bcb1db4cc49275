//! Risk monitor: join-time decision policy.
//!
//! Every identity join runs through the scorer; the node's configuration
//! decides what happens above threshold. Auto modes enforce immediately and
//! tell the node after the fact, otherwise a pending alert asks a reviewer
//! for a Kick/Ban/Dismiss decision. Dismissals are permanent suppressions
//! for that (node, identity) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::pool::DatabasePool;
use crate::error::{FederationError, Result};
use crate::federation::ledger::{NodeRecord, TrustLedger};
use crate::outbound::{
    AlertKind, Decision, DecisionRequest, EnforceAction, Enforcer, Notification, Notifier,
};
use crate::risk::joins::JoinWindowTracker;
use crate::risk::scorer::{self, IdentityProfile, JoinContext, ScoreResult};

/// What was done about a risky identity, as logged and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskActionKind {
    #[serde(rename = "auto-kicked")]
    AutoKicked,
    #[serde(rename = "auto-banned")]
    AutoBanned,
    #[serde(rename = "kicked")]
    Kicked,
    #[serde(rename = "banned")]
    Banned,
    #[serde(rename = "dismissed")]
    Dismissed,
}

/// Reviewer decision on a pending risk alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Kick,
    Ban,
    Dismiss,
}

/// Append-only log entry for every risk outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskActionRecord {
    pub node_id: String,
    pub identity_id: String,
    pub action: RiskActionKind,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResolution {
    pub action: RiskActionKind,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A pending manual alt alert awaiting a reviewer decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: String,
    pub node_id: String,
    pub identity: IdentityProfile,
    pub score: ScoreResult,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<AlertResolution>,
}

/// Permanent per-node suppression of alerts for one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissalEntry {
    pub node_id: String,
    pub identity_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of evaluating one identity join.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Risk engine disabled on this node
    Disabled,
    /// Identity previously dismissed on this node
    Suppressed,
    BelowThreshold { score: ScoreResult },
    /// Score crossed the threshold but the node has no alert destination
    Unrouted { score: ScoreResult },
    AutoActed {
        action: RiskActionKind,
        score: ScoreResult,
    },
    Alerted {
        alert_id: String,
        score: ScoreResult,
    },
}

pub struct RiskMonitor {
    ledger: Arc<TrustLedger>,
    joins: JoinWindowTracker,
    notifier: Arc<dyn Notifier>,
    enforcer: Arc<dyn Enforcer>,
    alerts: RwLock<HashMap<String, RiskAlert>>,
    dismissals: RwLock<HashMap<(String, String), DismissalEntry>>,
    actions: RwLock<Vec<RiskActionRecord>>,
    db: Option<Arc<DatabasePool>>,
    notify_timeout: std::time::Duration,
}

impl RiskMonitor {
    pub fn new(
        ledger: Arc<TrustLedger>,
        notifier: Arc<dyn Notifier>,
        enforcer: Arc<dyn Enforcer>,
        notify_timeout: std::time::Duration,
    ) -> Self {
        Self {
            ledger,
            joins: JoinWindowTracker::new(),
            notifier,
            enforcer,
            alerts: RwLock::new(HashMap::new()),
            dismissals: RwLock::new(HashMap::new()),
            actions: RwLock::new(Vec::new()),
            db: None,
            notify_timeout,
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Reload dismissals from the database mirror.
    pub async fn hydrate(&self) -> Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };

        let entries = db
            .risk()
            .load_dismissals()
            .await
            .map_err(FederationError::Storage)?;

        let mut dismissals = self.dismissals.write().await;
        *dismissals = entries
            .into_iter()
            .map(|e| ((e.node_id.clone(), e.identity_id.clone()), e))
            .collect();
        Ok(())
    }

    /// Evaluate an identity join and act per the node's configuration.
    ///
    /// The quick-join check runs against the window before this join is
    /// recorded, so an identity never quick-joins against itself.
    pub async fn on_identity_join(&self, node_id: &str, identity: IdentityProfile) -> JoinOutcome {
        let now = Utc::now();
        let node = self.ledger.get_or_create(node_id).await;

        if !node.risk.enabled {
            return JoinOutcome::Disabled;
        }
        if self.is_dismissed(node_id, &identity.identity_id).await {
            debug!(
                node_id = %node_id,
                identity_id = %identity.identity_id,
                "Join from dismissed identity, suppressing"
            );
            return JoinOutcome::Suppressed;
        }

        let quick_join = self
            .joins
            .has_recent_other_join(node_id, &identity.identity_id, now);
        let score = scorer::evaluate(&identity, &JoinContext { quick_join }, &node.risk.rules, now);
        self.joins.record_join(node_id, &identity.identity_id, now);

        if score.total < node.risk.threshold {
            return JoinOutcome::BelowThreshold { score };
        }

        info!(
            node_id = %node_id,
            identity_id = %identity.identity_id,
            score = score.total,
            threshold = node.risk.threshold,
            "Identity join crossed risk threshold"
        );

        if node.routing.alert_channel.is_none() {
            warn!(node_id = %node_id, "Risky join on node without alert destination");
            return JoinOutcome::Unrouted { score };
        }

        if node.risk.auto_kick {
            match self
                .auto_act(&node, &identity, &score, EnforceAction::Kick, now)
                .await
            {
                Ok(()) => {
                    return JoinOutcome::AutoActed {
                        action: RiskActionKind::AutoKicked,
                        score,
                    };
                }
                Err(e) => {
                    warn!(
                        node_id = %node_id,
                        identity_id = %identity.identity_id,
                        error = %e,
                        "Auto-kick failed, falling back to manual alert"
                    );
                }
            }
        } else if node.risk.auto_ban {
            match self
                .auto_act(&node, &identity, &score, EnforceAction::Ban, now)
                .await
            {
                Ok(()) => {
                    return JoinOutcome::AutoActed {
                        action: RiskActionKind::AutoBanned,
                        score,
                    };
                }
                Err(e) => {
                    warn!(
                        node_id = %node_id,
                        identity_id = %identity.identity_id,
                        error = %e,
                        "Auto-ban failed, falling back to manual alert"
                    );
                }
            }
        }

        let alert = RiskAlert {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            identity: identity.clone(),
            score: score.clone(),
            created_at: now,
            resolution: None,
        };
        {
            let mut alerts = self.alerts.write().await;
            alerts.insert(alert.id.clone(), alert.clone());
        }

        let request = DecisionRequest {
            kind: AlertKind::AltAlert,
            event_id: None,
            alert_id: Some(alert.id.clone()),
            subject_id: identity.identity_id.clone(),
            origin_node_id: None,
            origin_reliability: None,
            reason: None,
            score: Some(score.clone()),
            allowed_actions: vec![Decision::Kick, Decision::Ban, Decision::Dismiss],
            ping_target: node.routing.ping_target.clone(),
        };
        self.deliver(&node, &Notification::Decision(request)).await;

        JoinOutcome::Alerted {
            alert_id: alert.id,
            score,
        }
    }

    async fn auto_act(
        &self,
        node: &NodeRecord,
        identity: &IdentityProfile,
        score: &ScoreResult,
        action: EnforceAction,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.enforcer
            .enforce(&node.id, &identity.identity_id, action, "alt risk score")
            .await?;

        let kind = match action {
            EnforceAction::Kick => RiskActionKind::AutoKicked,
            EnforceAction::Ban => RiskActionKind::AutoBanned,
        };
        self.log_action(&node.id, &identity.identity_id, kind, "system", now)
            .await;

        info!(
            node_id = %node.id,
            identity_id = %identity.identity_id,
            action = ?kind,
            score = score.total,
            "Automatically enforced on risky join"
        );

        let notification = Notification::AutoEnforced {
            node_id: node.id.clone(),
            subject_id: identity.identity_id.clone(),
            action,
            origin_node_id: None,
            origin_reliability: None,
            reason: None,
            score: Some(score.clone()),
        };
        self.deliver(node, &notification).await;
        Ok(())
    }

    /// Terminal reviewer decision on a pending alert. Enforcement failure on
    /// Kick/Ban is logged and the resolution stands.
    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        action: AlertAction,
        actor_id: &str,
    ) -> Result<RiskAlert> {
        let now = Utc::now();
        let kind = match action {
            AlertAction::Kick => RiskActionKind::Kicked,
            AlertAction::Ban => RiskActionKind::Banned,
            AlertAction::Dismiss => RiskActionKind::Dismissed,
        };

        let alert = {
            let mut alerts = self.alerts.write().await;
            let alert = alerts
                .get_mut(alert_id)
                .ok_or_else(|| FederationError::UnknownAlert(alert_id.to_string()))?;
            if alert.resolution.is_some() {
                return Err(FederationError::AlertAlreadyResolved(alert_id.to_string()));
            }
            alert.resolution = Some(AlertResolution {
                action: kind,
                actor_id: actor_id.to_string(),
                timestamp: now,
            });
            alert.clone()
        };

        match action {
            AlertAction::Dismiss => {
                self.add_dismissal(&alert.node_id, &alert.identity.identity_id, now)
                    .await;
            }
            AlertAction::Kick | AlertAction::Ban => {
                let enforce_action = match action {
                    AlertAction::Kick => EnforceAction::Kick,
                    _ => EnforceAction::Ban,
                };
                if let Err(e) = self
                    .enforcer
                    .enforce(
                        &alert.node_id,
                        &alert.identity.identity_id,
                        enforce_action,
                        "alt risk score",
                    )
                    .await
                {
                    warn!(
                        node_id = %alert.node_id,
                        identity_id = %alert.identity.identity_id,
                        error = %e,
                        "Enforcement failed after alert resolution"
                    );
                }
            }
        }

        self.log_action(&alert.node_id, &alert.identity.identity_id, kind, actor_id, now)
            .await;
        info!(
            alert_id = %alert_id,
            action = ?kind,
            actor_id = %actor_id,
            "Risk alert resolved"
        );
        Ok(alert)
    }

    pub async fn is_dismissed(&self, node_id: &str, identity_id: &str) -> bool {
        let dismissals = self.dismissals.read().await;
        dismissals.contains_key(&(node_id.to_string(), identity_id.to_string()))
    }

    async fn add_dismissal(&self, node_id: &str, identity_id: &str, now: DateTime<Utc>) {
        let entry = DismissalEntry {
            node_id: node_id.to_string(),
            identity_id: identity_id.to_string(),
            created_at: now,
        };
        {
            let mut dismissals = self.dismissals.write().await;
            dismissals.insert((node_id.to_string(), identity_id.to_string()), entry.clone());
        }
        if let Some(db) = &self.db {
            if let Err(e) = db.risk().insert_dismissal(&entry).await {
                warn!(node_id = %node_id, identity_id = %identity_id, error = %e, "Failed to mirror dismissal");
            }
        }
    }

    /// Escape hatch: lift a permanent dismissal so future joins alert again.
    pub async fn clear_dismissal(&self, node_id: &str, identity_id: &str) -> bool {
        let removed = {
            let mut dismissals = self.dismissals.write().await;
            dismissals
                .remove(&(node_id.to_string(), identity_id.to_string()))
                .is_some()
        };
        if removed {
            if let Some(db) = &self.db {
                if let Err(e) = db.risk().delete_dismissal(node_id, identity_id).await {
                    warn!(node_id = %node_id, identity_id = %identity_id, error = %e, "Failed to mirror dismissal removal");
                }
            }
        }
        removed
    }

    async fn log_action(
        &self,
        node_id: &str,
        identity_id: &str,
        action: RiskActionKind,
        actor_id: &str,
        now: DateTime<Utc>,
    ) {
        let record = RiskActionRecord {
            node_id: node_id.to_string(),
            identity_id: identity_id.to_string(),
            action,
            actor_id: actor_id.to_string(),
            timestamp: now,
        };
        {
            let mut actions = self.actions.write().await;
            actions.push(record.clone());
        }
        if let Some(db) = &self.db {
            if let Err(e) = db.risk().insert_action(&record).await {
                warn!(node_id = %node_id, error = %e, "Failed to mirror risk action");
            }
        }
    }

    pub async fn get_alert(&self, alert_id: &str) -> Option<RiskAlert> {
        let alerts = self.alerts.read().await;
        alerts.get(alert_id).cloned()
    }

    pub async fn pending_alerts(&self, node_id: &str) -> Vec<RiskAlert> {
        let alerts = self.alerts.read().await;
        let mut pending: Vec<_> = alerts
            .values()
            .filter(|a| a.node_id == node_id && a.resolution.is_none())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending
    }

    pub async fn actions_for(&self, node_id: &str) -> Vec<RiskActionRecord> {
        let actions = self.actions.read().await;
        actions
            .iter()
            .filter(|r| r.node_id == node_id)
            .cloned()
            .collect()
    }

    /// Periodic join-window maintenance.
    pub fn sweep_join_windows(&self) {
        self.joins.sweep(Utc::now());
    }

    async fn deliver(&self, node: &NodeRecord, notification: &Notification) {
        let Some(destination) = node.routing.alert_channel.as_deref() else {
            return;
        };
        match tokio::time::timeout(
            self.notify_timeout,
            self.notifier.notify(destination, notification),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(node_id = %node.id, error = %e, "Alert delivery failed");
            }
            Err(_) => {
                warn!(node_id = %node.id, "Alert delivery timed out");
            }
        }
    }
}
