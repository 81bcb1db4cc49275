//! Outbound collaborator seams.
//!
//! The core does not talk to a chat platform directly. Alert delivery and
//! enforcement actions (kick/ban) go through the [`Notifier`] and
//! [`Enforcer`] traits; the binary wires webhook-backed implementations,
//! tests wire recording mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::risk::scorer::ScoreResult;

/// What kind of pending-decision affordance a notification carries.
///
/// The original system had one bespoke button set per alert type; here every
/// pending decision is the same shape with an explicit allowed-action set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// A peer's ban awaiting Accept/Dismiss
    BanAlert,
    /// A flagged likely-alt identity awaiting Kick/Ban/Dismiss
    AltAlert,
    /// A previously banned identity rejoined, awaiting Ban/Dismiss
    JoinAlert,
    /// A human-flagged report awaiting privileged Accept/Reject
    ReviewFlag,
}

/// A decision a reviewer may take on a pending alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accept,
    Dismiss,
    Kick,
    Ban,
    Reject,
}

/// Enforcement action to perform against the underlying platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnforceAction {
    Kick,
    Ban,
}

/// A pending decision surfaced to a node's reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub kind: AlertKind,
    /// Enforcement event id, for ban/review alerts
    pub event_id: Option<i64>,
    /// Risk alert id, for alt alerts
    pub alert_id: Option<String>,
    /// The identity the decision concerns
    pub subject_id: String,
    /// Reporting node and its reliability, when the alert has an origin
    pub origin_node_id: Option<String>,
    pub origin_reliability: Option<u8>,
    pub reason: Option<String>,
    /// Risk score, for alt alerts
    pub score: Option<ScoreResult>,
    pub allowed_actions: Vec<Decision>,
    /// Optional ping target from the node's routing config
    pub ping_target: Option<String>,
}

/// Payload handed to the notify collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notification {
    /// An alert that needs a reviewer decision
    Decision(DecisionRequest),
    /// Notice that the system already acted automatically
    AutoEnforced {
        node_id: String,
        subject_id: String,
        action: EnforceAction,
        origin_node_id: Option<String>,
        origin_reliability: Option<u8>,
        reason: Option<String>,
        score: Option<ScoreResult>,
    },
}

/// Best-effort alert delivery to a node's configured destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: &str, notification: &Notification) -> anyhow::Result<()>;
}

/// Performs the platform kick/ban against a node.
#[async_trait]
pub trait Enforcer: Send + Sync {
    async fn enforce(
        &self,
        node_id: &str,
        subject_id: &str,
        action: EnforceAction,
        reason: &str,
    ) -> anyhow::Result<()>;
}

/// Posts notifications as JSON to the destination URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, destination: &str, notification: &Notification) -> anyhow::Result<()> {
        let response = self
            .client
            .post(destination)
            .json(notification)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("webhook returned {}", response.status());
        }

        debug!(destination = %destination, "Delivered notification");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct EnforceCommand<'a> {
    node_id: &'a str,
    subject_id: &'a str,
    action: EnforceAction,
    reason: &'a str,
}

/// Sends enforcement commands to the platform adapter endpoint.
pub struct WebhookEnforcer {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookEnforcer {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Enforcer for WebhookEnforcer {
    async fn enforce(
        &self,
        node_id: &str,
        subject_id: &str,
        action: EnforceAction,
        reason: &str,
    ) -> anyhow::Result<()> {
        let command = EnforceCommand {
            node_id,
            subject_id,
            action,
            reason,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&command)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("enforcement endpoint returned {}", response.status());
        }

        debug!(
            node_id = %node_id,
            subject_id = %subject_id,
            action = ?action,
            "Enforcement action applied"
        );
        Ok(())
    }
}
