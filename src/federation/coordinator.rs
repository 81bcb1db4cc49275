//! Propagation coordinator: the ingest/resolve pipeline.
//!
//! Receives ban reports from origin nodes, runs them through dedup, origin
//! validation and rate admission, persists the enforcement event, then fans
//! out to every eligible peer. Peers either get a manual decision request or,
//! when they opted into auto-ban and the origin is trusted enough, an
//! immediate enforcement with a notice after the fact.

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FederationError, Result};
use crate::federation::events::{EnforcementEvent, EventStatus, EventStore};
use crate::federation::ledger::{NodeRecord, TrustLedger, AUTO_ACT_RELIABILITY_FLOOR};
use crate::federation::rate_limit::RateLimiter;
use crate::outbound::{
    AlertKind, Decision, DecisionRequest, EnforceAction, Enforcer, Notification, Notifier,
};

pub const DEDUP_WINDOW_SECS: i64 = 300;

/// Incoming ban report from an origin node.
#[derive(Debug, Clone, Deserialize)]
pub struct BanReport {
    pub subject_id: String,
    pub origin_node_id: String,
    pub reporter_id: String,
    pub reason: Option<String>,
}

/// Terminal decision on a pending enforcement event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Accept,
    Dismiss,
}

/// Outcome of [`PropagationCoordinator::ingest`]. Dropped reports are
/// logged but produce no event record.
#[derive(Debug)]
pub enum IngestResult {
    /// Another event for this subject exists inside the dedup window
    Duplicate,
    /// Origin node was never registered
    UnknownOrigin,
    /// Origin is blacklisted, its reports are ignored
    OriginBlacklisted,
    /// Origin exceeded its report budget
    RateLimited,
    Propagated {
        event: EnforcementEvent,
        auto_acted: Vec<String>,
        alerted: Vec<String>,
    },
}

pub struct PropagationCoordinator {
    ledger: Arc<TrustLedger>,
    events: Arc<EventStore>,
    limiter: RateLimiter,
    notifier: Arc<dyn Notifier>,
    enforcer: Arc<dyn Enforcer>,
    dedup_window: Duration,
    notify_timeout: std::time::Duration,
}

impl PropagationCoordinator {
    pub fn new(
        ledger: Arc<TrustLedger>,
        events: Arc<EventStore>,
        limiter: RateLimiter,
        notifier: Arc<dyn Notifier>,
        enforcer: Arc<dyn Enforcer>,
        notify_timeout: std::time::Duration,
    ) -> Self {
        Self {
            ledger,
            events,
            limiter,
            notifier,
            enforcer,
            dedup_window: Duration::seconds(DEDUP_WINDOW_SECS),
            notify_timeout,
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn ledger(&self) -> &Arc<TrustLedger> {
        &self.ledger
    }

    pub fn events(&self) -> &Arc<EventStore> {
        &self.events
    }

    /// Run a ban report through the admission pipeline and fan out.
    ///
    /// Order matters: dedup before rate admission, so a duplicate never
    /// consumes rate budget, and rate admission before persistence, so a
    /// denied report leaves no event record. Persistence re-checks dedup
    /// under the store's write guard, so simultaneous reports for one
    /// subject cannot both pass the early check and create two events.
    pub async fn ingest(&self, report: BanReport) -> IngestResult {
        let now = Utc::now();

        if self
            .events
            .recent_exists(&report.subject_id, self.dedup_window, now)
            .await
        {
            debug!(
                subject_id = %report.subject_id,
                origin = %report.origin_node_id,
                "Duplicate ban report inside dedup window, dropping"
            );
            return IngestResult::Duplicate;
        }

        let origin = match self.ledger.get(&report.origin_node_id).await {
            Some(origin) => origin,
            None => {
                warn!(origin = %report.origin_node_id, "Ban report from unregistered node, dropping");
                return IngestResult::UnknownOrigin;
            }
        };
        if origin.blacklisted {
            info!(origin = %origin.id, "Ban report from blacklisted node, dropping");
            return IngestResult::OriginBlacklisted;
        }

        if !self.limiter.try_admit(&origin.id, now) {
            warn!(origin = %origin.id, "Ban report rate limit exceeded, dropping");
            return IngestResult::RateLimited;
        }

        let Some(event) = self
            .events
            .create_if_absent(
                &report.subject_id,
                &origin.id,
                &report.reporter_id,
                report.reason.clone(),
                EventStatus::Pending,
                self.dedup_window,
                now,
            )
            .await
        else {
            debug!(
                subject_id = %report.subject_id,
                origin = %report.origin_node_id,
                "Concurrent duplicate ban report, dropping"
            );
            return IngestResult::Duplicate;
        };
        info!(
            event_id = event.id,
            subject_id = %event.subject_id,
            origin = %origin.id,
            "Enforcement event created"
        );

        let mut auto_acted = Vec::new();
        let mut alerted = Vec::new();
        for target in self.ledger.fanout_targets(&origin.id).await {
            if target.routing.auto_ban && origin.reliability >= AUTO_ACT_RELIABILITY_FLOOR {
                match self.auto_act(&target, &event, &origin).await {
                    Ok(()) => {
                        auto_acted.push(target.id);
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            node_id = %target.id,
                            event_id = event.id,
                            error = %e,
                            "Auto-ban failed, falling back to manual alert"
                        );
                    }
                }
            }
            self.send_decision_request(&target, &event, &origin).await;
            alerted.push(target.id);
        }

        IngestResult::Propagated {
            event,
            auto_acted,
            alerted,
        }
    }

    /// Enforce at a trusting peer without waiting for a reviewer. The event
    /// stays `Pending` globally; only an action record and the origin's +1
    /// are written, and the peer is told what happened.
    async fn auto_act(
        &self,
        target: &NodeRecord,
        event: &EnforcementEvent,
        origin: &NodeRecord,
    ) -> anyhow::Result<()> {
        let reason = event.reason.as_deref().unwrap_or("federated ban");
        self.enforcer
            .enforce(&target.id, &event.subject_id, EnforceAction::Ban, reason)
            .await?;

        if let Err(e) = self.events.record_auto_accept(event.id, Utc::now()).await {
            warn!(event_id = event.id, error = %e, "Failed to record auto-acceptance");
        }
        if let Err(e) = self.ledger.adjust_reliability(&origin.id, 1).await {
            warn!(origin = %origin.id, error = %e, "Failed to credit origin reliability");
        }

        info!(
            node_id = %target.id,
            subject_id = %event.subject_id,
            origin = %origin.id,
            "Auto-banned on peer ban report"
        );

        let notification = Notification::AutoEnforced {
            node_id: target.id.clone(),
            subject_id: event.subject_id.clone(),
            action: EnforceAction::Ban,
            origin_node_id: Some(origin.id.clone()),
            origin_reliability: Some(origin.reliability),
            reason: event.reason.clone(),
            score: None,
        };
        self.deliver(target, &notification).await;
        Ok(())
    }

    async fn send_decision_request(
        &self,
        target: &NodeRecord,
        event: &EnforcementEvent,
        origin: &NodeRecord,
    ) {
        let request = DecisionRequest {
            kind: AlertKind::BanAlert,
            event_id: Some(event.id),
            alert_id: None,
            subject_id: event.subject_id.clone(),
            origin_node_id: Some(origin.id.clone()),
            origin_reliability: Some(origin.reliability),
            reason: event.reason.clone(),
            score: None,
            allowed_actions: vec![Decision::Accept, Decision::Dismiss],
            ping_target: target.routing.ping_target.clone(),
        };
        self.deliver(target, &Notification::Decision(request)).await;
    }

    /// Fire-and-continue delivery: a slow or failing peer never blocks the
    /// rest of the fan-out.
    async fn deliver(&self, target: &NodeRecord, notification: &Notification) {
        let Some(destination) = target.routing.alert_channel.as_deref() else {
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
                warn!(node_id = %target.id, error = %e, "Alert delivery failed");
            }
            Err(_) => {
                warn!(node_id = %target.id, "Alert delivery timed out");
            }
        }
    }

    /// Terminal reviewer decision on a pending event.
    ///
    /// Exactly one caller wins the `Pending` transition; everyone after gets
    /// [`FederationError::AlreadyResolved`]. Accept credits the origin +1,
    /// Dismiss costs it -1. When `acting_node` is given on Accept, the local
    /// ban is attempted; enforcement failure is logged and the resolution
    /// stands.
    pub async fn resolve(
        &self,
        event_id: i64,
        resolution: Resolution,
        actor_id: &str,
        acting_node: Option<&str>,
    ) -> Result<EnforcementEvent> {
        let to = match resolution {
            Resolution::Accept => EventStatus::Accepted,
            Resolution::Dismiss => EventStatus::Dismissed,
        };
        let event = self
            .events
            .try_transition(event_id, EventStatus::Pending, to, actor_id, Utc::now())
            .await?;

        let delta: i8 = match resolution {
            Resolution::Accept => 1,
            Resolution::Dismiss => -1,
        };
        if let Err(e) = self
            .ledger
            .adjust_reliability(&event.origin_node_id, delta)
            .await
        {
            warn!(origin = %event.origin_node_id, error = %e, "Failed to adjust origin reliability");
        }

        info!(
            event_id,
            status = ?event.status,
            actor_id = %actor_id,
            "Enforcement event resolved"
        );

        if resolution == Resolution::Accept {
            if let Some(node_id) = acting_node {
                let reason = event.reason.as_deref().unwrap_or("federated ban");
                if let Err(e) = self
                    .enforcer
                    .enforce(node_id, &event.subject_id, EnforceAction::Ban, reason)
                    .await
                {
                    warn!(
                        node_id = %node_id,
                        event_id,
                        error = %e,
                        "Local enforcement failed after acceptance"
                    );
                }
            }
        }

        Ok(event)
    }

    /// File a suspicious report for privileged review. No fan-out, no
    /// reliability movement; only `resolve_review` closes it. The filing
    /// node's reviewers are notified when it has an alert destination.
    pub async fn flag_for_review(
        &self,
        subject_id: &str,
        origin_node_id: &str,
        reporter_id: &str,
        reason: Option<String>,
    ) -> EnforcementEvent {
        let event = self
            .events
            .create(
                subject_id,
                origin_node_id,
                reporter_id,
                reason,
                EventStatus::UnderReview,
                Utc::now(),
            )
            .await;
        info!(
            event_id = event.id,
            subject_id = %subject_id,
            origin = %origin_node_id,
            "Report flagged for review"
        );

        if let Some(node) = self.ledger.get(origin_node_id).await {
            let request = DecisionRequest {
                kind: AlertKind::ReviewFlag,
                event_id: Some(event.id),
                alert_id: None,
                subject_id: subject_id.to_string(),
                origin_node_id: Some(origin_node_id.to_string()),
                origin_reliability: None,
                reason: event.reason.clone(),
                score: None,
                allowed_actions: vec![Decision::Accept, Decision::Reject],
                ping_target: node.routing.ping_target.clone(),
            };
            self.deliver(&node, &Notification::Decision(request)).await;
        }
        event
    }

    /// Privileged reviewer verdict on a flagged report.
    pub async fn resolve_review(
        &self,
        event_id: i64,
        approve: bool,
        actor_id: &str,
    ) -> Result<EnforcementEvent> {
        let to = if approve {
            EventStatus::Accepted
        } else {
            EventStatus::Rejected
        };
        let event = self
            .events
            .try_transition(event_id, EventStatus::UnderReview, to, actor_id, Utc::now())
            .await?;
        info!(event_id, status = ?event.status, actor_id = %actor_id, "Review resolved");
        Ok(event)
    }

    /// Warn a node when a subject with an accepted ban on record joins it.
    /// Returns true when a Ban/Dismiss decision request was delivered.
    pub async fn notify_banned_rejoin(&self, node_id: &str, subject_id: &str) -> bool {
        let banned = self
            .events
            .list_by_subject(subject_id)
            .await
            .into_iter()
            .find(|e| e.status == EventStatus::Accepted);
        let Some(event) = banned else {
            return false;
        };
        let Some(node) = self.ledger.get(node_id).await else {
            return false;
        };
        if node.blacklisted || node.routing.alert_channel.is_none() {
            return false;
        }

        let origin_reliability = self
            .ledger
            .get(&event.origin_node_id)
            .await
            .map(|n| n.reliability);
        info!(
            node_id = %node_id,
            subject_id = %subject_id,
            event_id = event.id,
            "Previously banned subject rejoined"
        );
        let request = DecisionRequest {
            kind: AlertKind::JoinAlert,
            event_id: Some(event.id),
            alert_id: None,
            subject_id: subject_id.to_string(),
            origin_node_id: Some(event.origin_node_id.clone()),
            origin_reliability,
            reason: event.reason.clone(),
            score: None,
            allowed_actions: vec![Decision::Ban, Decision::Dismiss],
            ping_target: node.routing.ping_target.clone(),
        };
        self.deliver(&node, &Notification::Decision(request)).await;
        true
    }

    pub async fn list_events(&self, subject_id: &str) -> Vec<EnforcementEvent> {
        self.events.list_by_subject(subject_id).await
    }

    pub async fn pending_reviews(&self) -> Vec<EnforcementEvent> {
        self.events.list_under_review().await
    }

    /// Blacklist a node outright, creating it if it was never registered.
    pub async fn strike_node(&self, node_id: &str) -> NodeRecord {
        self.ledger.strike(node_id).await
    }

    /// Drop a node and every event it originated.
    pub async fn remove_node(&self, node_id: &str) -> Result<usize> {
        self.ledger
            .remove(node_id)
            .await
            .ok_or_else(|| FederationError::UnknownNode(node_id.to_string()))?;
        let removed = self.events.remove_origin(node_id).await;
        info!(node_id = %node_id, removed_events = removed, "Node removed with cascade");
        Ok(removed)
    }

    /// Periodic rate-limiter window maintenance.
    pub fn sweep_rate_windows(&self) {
        self.limiter.cleanup(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::events::SYSTEM_ACTOR;
    use crate::federation::ledger::RoutingUpdate;
    use crate::federation::rate_limit::RateLimiterConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Notification)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            destination: &str,
            notification: &Notification,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .await
                .push((destination.to_string(), notification.clone()));
            Ok(())
        }
    }

    struct RecordingEnforcer {
        fail: AtomicBool,
        actions: Mutex<Vec<(String, String, EnforceAction)>>,
    }

    #[async_trait]
    impl Enforcer for RecordingEnforcer {
        async fn enforce(
            &self,
            node_id: &str,
            subject_id: &str,
            action: EnforceAction,
            _reason: &str,
        ) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("enforcement unavailable");
            }
            self.actions
                .lock()
                .await
                .push((node_id.to_string(), subject_id.to_string(), action));
            Ok(())
        }
    }

    fn build() -> (
        PropagationCoordinator,
        Arc<RecordingNotifier>,
        Arc<RecordingEnforcer>,
    ) {
        let notifier = Arc::new(RecordingNotifier {
            sent: Mutex::new(Vec::new()),
        });
        let enforcer = Arc::new(RecordingEnforcer {
            fail: AtomicBool::new(false),
            actions: Mutex::new(Vec::new()),
        });
        let coordinator = PropagationCoordinator::new(
            Arc::new(TrustLedger::new()),
            Arc::new(EventStore::new()),
            RateLimiter::new(RateLimiterConfig::default()),
            notifier.clone(),
            enforcer.clone(),
            std::time::Duration::from_secs(1),
        );
        (coordinator, notifier, enforcer)
    }

    fn report(subject: &str, origin: &str) -> BanReport {
        BanReport {
            subject_id: subject.to_string(),
            origin_node_id: origin.to_string(),
            reporter_id: "mod-1".to_string(),
            reason: Some("spam".to_string()),
        }
    }

    async fn register_routable(coordinator: &PropagationCoordinator, node_id: &str) {
        coordinator
            .ledger()
            .update_routing(
                node_id,
                RoutingUpdate {
                    alert_channel: Some(format!("https://hooks.test/{node_id}")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_origin() {
        let (coordinator, _, _) = build();
        assert!(matches!(
            coordinator.ingest(report("u1", "ghost")).await,
            IngestResult::UnknownOrigin
        ));
    }

    #[tokio::test]
    async fn test_ingest_rejects_blacklisted_origin() {
        let (coordinator, _, _) = build();
        coordinator.strike_node("bad").await;
        assert!(matches!(
            coordinator.ingest(report("u1", "bad")).await,
            IngestResult::OriginBlacklisted
        ));
    }

    #[tokio::test]
    async fn test_duplicate_inside_window_dropped() {
        let (coordinator, _, _) = build();
        coordinator.ledger().get_or_create("origin").await;

        assert!(matches!(
            coordinator.ingest(report("u1", "origin")).await,
            IngestResult::Propagated { .. }
        ));
        assert!(matches!(
            coordinator.ingest(report("u1", "origin")).await,
            IngestResult::Duplicate
        ));
        // Different subject is not a duplicate
        assert!(matches!(
            coordinator.ingest(report("u2", "origin")).await,
            IngestResult::Propagated { .. }
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_drops_without_event_record() {
        let (coordinator, _, _) = build();
        coordinator.ledger().get_or_create("origin").await;

        for i in 0..5 {
            assert!(matches!(
                coordinator.ingest(report(&format!("u{i}"), "origin")).await,
                IngestResult::Propagated { .. }
            ));
        }
        assert!(matches!(
            coordinator.ingest(report("u5", "origin")).await,
            IngestResult::RateLimited
        ));
        assert!(coordinator.list_events("u5").await.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_alerts_manual_peers() {
        let (coordinator, notifier, _) = build();
        coordinator.ledger().get_or_create("origin").await;
        register_routable(&coordinator, "peer_a").await;
        register_routable(&coordinator, "peer_b").await;

        let result = coordinator.ingest(report("u1", "origin")).await;
        let IngestResult::Propagated {
            auto_acted,
            mut alerted,
            ..
        } = result
        else {
            panic!("expected propagation");
        };
        alerted.sort();
        assert!(auto_acted.is_empty());
        assert_eq!(alerted, vec!["peer_a", "peer_b"]);

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .all(|(_, n)| matches!(n, Notification::Decision(r) if r.kind == AlertKind::BanAlert)));
    }

    #[tokio::test]
    async fn test_auto_act_keeps_event_pending_and_credits_origin() {
        let (coordinator, _, enforcer) = build();
        coordinator.ledger().get_or_create("origin").await;
        coordinator
            .ledger()
            .update_routing(
                "peer_auto",
                RoutingUpdate {
                    alert_channel: Some("https://hooks.test/peer_auto".into()),
                    auto_ban: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = coordinator.ingest(report("u1", "origin")).await;
        let IngestResult::Propagated {
            event,
            auto_acted,
            alerted,
        } = result
        else {
            panic!("expected propagation");
        };
        assert_eq!(auto_acted, vec!["peer_auto"]);
        assert!(alerted.is_empty());

        // Still pending for other peers' manual decisions
        let stored = coordinator.events().get(event.id).await.unwrap();
        assert_eq!(stored.status, EventStatus::Pending);

        let actions = coordinator.events().actions_for(event.id).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].actor_id, SYSTEM_ACTOR);

        assert_eq!(
            coordinator.ledger().get("origin").await.unwrap().reliability,
            100
        );
        assert_eq!(enforcer.actions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_act_skipped_for_low_reliability_origin() {
        let (coordinator, _, enforcer) = build();
        coordinator.ledger().get_or_create("origin").await;
        for _ in 0..51 {
            coordinator
                .ledger()
                .adjust_reliability("origin", -1)
                .await
                .unwrap();
        }
        coordinator
            .ledger()
            .update_routing(
                "peer_auto",
                RoutingUpdate {
                    alert_channel: Some("https://hooks.test/peer_auto".into()),
                    auto_ban: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = coordinator.ingest(report("u1", "origin")).await;
        let IngestResult::Propagated {
            auto_acted, alerted, ..
        } = result
        else {
            panic!("expected propagation");
        };
        assert!(auto_acted.is_empty());
        assert_eq!(alerted, vec!["peer_auto"]);
        assert!(enforcer.actions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_auto_act_failure_falls_back_to_alert() {
        let (coordinator, notifier, enforcer) = build();
        coordinator.ledger().get_or_create("origin").await;
        coordinator
            .ledger()
            .update_routing(
                "peer_auto",
                RoutingUpdate {
                    alert_channel: Some("https://hooks.test/peer_auto".into()),
                    auto_ban: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        enforcer.fail.store(true, Ordering::SeqCst);

        let result = coordinator.ingest(report("u1", "origin")).await;
        let IngestResult::Propagated {
            auto_acted, alerted, ..
        } = result
        else {
            panic!("expected propagation");
        };
        assert!(auto_acted.is_empty());
        assert_eq!(alerted, vec!["peer_auto"]);

        let sent = notifier.sent.lock().await;
        assert!(matches!(&sent[0].1, Notification::Decision(_)));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent_and_moves_reliability_once() {
        let (coordinator, _, _) = build();
        coordinator.ledger().get_or_create("origin").await;

        let IngestResult::Propagated { event, .. } =
            coordinator.ingest(report("u1", "origin")).await
        else {
            panic!("expected propagation");
        };

        for _ in 0..2 {
            coordinator
                .ledger()
                .adjust_reliability("origin", -1)
                .await
                .unwrap();
        }

        let resolved = coordinator
            .resolve(event.id, Resolution::Accept, "mod-2", None)
            .await
            .unwrap();
        assert_eq!(resolved.status, EventStatus::Accepted);
        assert_eq!(
            coordinator.ledger().get("origin").await.unwrap().reliability,
            99
        );

        // Second resolution is a reported no-op, no further movement
        let err = coordinator
            .resolve(event.id, Resolution::Dismiss, "mod-3", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::AlreadyResolved { .. }));
        assert_eq!(
            coordinator.ledger().get("origin").await.unwrap().reliability,
            99
        );
    }

    #[tokio::test]
    async fn test_dismissal_costs_origin_reliability() {
        let (coordinator, _, _) = build();
        coordinator.ledger().get_or_create("origin").await;

        let IngestResult::Propagated { event, .. } =
            coordinator.ingest(report("u1", "origin")).await
        else {
            panic!("expected propagation");
        };
        coordinator
            .resolve(event.id, Resolution::Dismiss, "mod-2", None)
            .await
            .unwrap();
        assert_eq!(
            coordinator.ledger().get("origin").await.unwrap().reliability,
            99
        );
    }

    #[tokio::test]
    async fn test_review_flow() {
        let (coordinator, _, _) = build();
        coordinator.ledger().get_or_create("origin").await;

        let event = coordinator
            .flag_for_review("u1", "origin", "mod-1", Some("looks personal".into()))
            .await;
        assert_eq!(event.status, EventStatus::UnderReview);
        assert_eq!(coordinator.pending_reviews().await.len(), 1);

        let rejected = coordinator
            .resolve_review(event.id, false, "owner")
            .await
            .unwrap();
        assert_eq!(rejected.status, EventStatus::Rejected);
        assert!(coordinator.pending_reviews().await.is_empty());

        // Terminal: cannot resolve again
        assert!(coordinator
            .resolve_review(event.id, true, "owner")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_review_flag_notifies_filing_node() {
        let (coordinator, notifier, _) = build();
        register_routable(&coordinator, "origin").await;

        coordinator
            .flag_for_review("u1", "origin", "mod-1", None)
            .await;

        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        let Notification::Decision(request) = &sent[0].1 else {
            panic!("expected decision request");
        };
        assert_eq!(request.kind, AlertKind::ReviewFlag);
        assert_eq!(
            request.allowed_actions,
            vec![Decision::Accept, Decision::Reject]
        );
    }

    #[tokio::test]
    async fn test_banned_rejoin_alerts_with_ban_dismiss() {
        let (coordinator, notifier, _) = build();
        coordinator.ledger().get_or_create("origin").await;
        register_routable(&coordinator, "peer").await;

        let IngestResult::Propagated { event, .. } =
            coordinator.ingest(report("u1", "origin")).await
        else {
            panic!("expected propagation");
        };

        // Still pending: no rejoin alert yet
        assert!(!coordinator.notify_banned_rejoin("peer", "u1").await);

        coordinator
            .resolve(event.id, Resolution::Accept, "mod-2", None)
            .await
            .unwrap();
        assert!(coordinator.notify_banned_rejoin("peer", "u1").await);
        // No accepted ban on record for this subject
        assert!(!coordinator.notify_banned_rejoin("peer", "u2").await);

        let sent = notifier.sent.lock().await;
        let rejoin = sent
            .iter()
            .filter_map(|(_, n)| match n {
                Notification::Decision(r) if r.kind == AlertKind::JoinAlert => Some(r),
                _ => None,
            })
            .next()
            .unwrap();
        assert_eq!(rejoin.subject_id, "u1");
        assert_eq!(
            rejoin.allowed_actions,
            vec![Decision::Ban, Decision::Dismiss]
        );
    }

    #[tokio::test]
    async fn test_remove_node_cascades_events() {
        let (coordinator, _, _) = build();
        coordinator.ledger().get_or_create("origin").await;
        coordinator.ingest(report("u1", "origin")).await;
        coordinator.ingest(report("u2", "origin")).await;

        let removed = coordinator.remove_node("origin").await.unwrap();
        assert_eq!(removed, 2);
        assert!(coordinator.ledger().get("origin").await.is_none());
        assert!(coordinator.list_events("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_new_node_defaults() {
        let (coordinator, _, _) = build();
        let node = coordinator.ledger().get_or_create("fresh").await;
        assert_eq!(node.reliability, 100);
        assert!(!node.blacklisted);
        assert!(node.risk.enabled);
    }
}
