//! Integration tests for the banlink federation service
//!
//! Exercises the full propagation pipeline and the risk engine end to end
//! with recording notifier/enforcer doubles, all in-memory.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use banlink::federation::coordinator::{BanReport, IngestResult, Resolution};
use banlink::federation::events::{EventStatus, EventStore, SYSTEM_ACTOR};
use banlink::federation::ledger::{RiskUpdate, RoutingUpdate, TrustLedger};
use banlink::federation::rate_limit::{RateLimiter, RateLimiterConfig};
use banlink::federation::PropagationCoordinator;
use banlink::outbound::{EnforceAction, Enforcer, Notification, Notifier};
use banlink::risk::joins::JoinWindowTracker;
use banlink::risk::monitor::{AlertAction, JoinOutcome, RiskActionKind, RiskMonitor};
use banlink::risk::scorer::{self, IdentityProfile, JoinContext};
use banlink::{FederationError, RuleToggles};

struct RecordingNotifier {
    fail: AtomicBool,
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, destination: &str, notification: &Notification) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .push((destination.to_string(), notification.clone()));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("delivery unavailable");
        }
        Ok(())
    }
}

struct RecordingEnforcer {
    fail: AtomicBool,
    actions: Mutex<Vec<(String, String, EnforceAction)>>,
}

impl RecordingEnforcer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            actions: Mutex::new(Vec::new()),
        })
    }
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

struct Harness {
    ledger: Arc<TrustLedger>,
    coordinator: PropagationCoordinator,
    monitor: RiskMonitor,
    notifier: Arc<RecordingNotifier>,
    enforcer: Arc<RecordingEnforcer>,
}

fn build_harness() -> Harness {
    let ledger = Arc::new(TrustLedger::new());
    let events = Arc::new(EventStore::new());
    let notifier = RecordingNotifier::new();
    let enforcer = RecordingEnforcer::new();
    let timeout = std::time::Duration::from_secs(1);

    let coordinator = PropagationCoordinator::new(
        ledger.clone(),
        events,
        RateLimiter::new(RateLimiterConfig::default()),
        notifier.clone(),
        enforcer.clone(),
        timeout,
    );
    let monitor = RiskMonitor::new(ledger.clone(), notifier.clone(), enforcer.clone(), timeout);

    Harness {
        ledger,
        coordinator,
        monitor,
        notifier,
        enforcer,
    }
}

fn report(subject: &str, origin: &str) -> BanReport {
    BanReport {
        subject_id: subject.to_string(),
        origin_node_id: origin.to_string(),
        reporter_id: "mod-1".to_string(),
        reason: Some("spam".to_string()),
    }
}

async fn route(ledger: &TrustLedger, node_id: &str) {
    ledger
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

fn risky_identity(id: &str) -> IdentityProfile {
    IdentityProfile {
        identity_id: id.to_string(),
        handle: "Alt_User".to_string(),
        display_name: None,
        created_at: Utc::now() - Duration::days(3),
        has_avatar: false,
    }
}

/// A ban at node A fans out to an auto-banning node B (enforced, origin
/// credited, event left pending) and a manual node C, whose reviewer then
/// dismisses the event and costs the origin a point.
#[tokio::test]
async fn test_ban_propagation_end_to_end() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;
    route(&h.ledger, "node_b").await;
    h.ledger
        .update_routing(
            "node_b",
            RoutingUpdate {
                auto_ban: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    route(&h.ledger, "node_c").await;

    // Drop the origin below the cap so the auto-act credit is observable
    for _ in 0..2 {
        h.ledger.adjust_reliability("node_a", -1).await.unwrap();
    }

    let result = h.coordinator.ingest(report("user-1", "node_a")).await;
    let IngestResult::Propagated {
        event,
        auto_acted,
        alerted,
    } = result
    else {
        panic!("expected propagation");
    };
    assert_eq!(auto_acted, vec!["node_b"]);
    assert_eq!(alerted, vec!["node_c"]);

    // B enforced a ban, the origin earned +1, the event stays pending
    let actions = h.enforcer.actions.lock().await;
    assert_eq!(
        actions.as_slice(),
        &[(
            "node_b".to_string(),
            "user-1".to_string(),
            EnforceAction::Ban
        )]
    );
    drop(actions);
    assert_eq!(h.ledger.get("node_a").await.unwrap().reliability, 99);
    assert_eq!(
        h.coordinator.events().get(event.id).await.unwrap().status,
        EventStatus::Pending
    );

    let event_actions = h.coordinator.events().actions_for(event.id).await;
    assert_eq!(event_actions.len(), 1);
    assert_eq!(event_actions[0].actor_id, SYSTEM_ACTOR);

    // B got an after-the-fact notice, C got a decision request
    {
        let sent = h.notifier.sent.lock().await;
        assert_eq!(sent.len(), 2);
        let to_b = sent
            .iter()
            .find(|(dest, _)| dest.ends_with("node_b"))
            .unwrap();
        assert!(matches!(to_b.1, Notification::AutoEnforced { .. }));
        let to_c = sent
            .iter()
            .find(|(dest, _)| dest.ends_with("node_c"))
            .unwrap();
        assert!(matches!(to_c.1, Notification::Decision(_)));
    }

    // C's reviewer dismisses: terminal status, origin loses a point
    let resolved = h
        .coordinator
        .resolve(event.id, Resolution::Dismiss, "mod-c", None)
        .await
        .unwrap();
    assert_eq!(resolved.status, EventStatus::Dismissed);
    assert_eq!(h.ledger.get("node_a").await.unwrap().reliability, 98);

    // The decision is final
    let err = h
        .coordinator
        .resolve(event.id, Resolution::Accept, "mod-c2", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::AlreadyResolved { .. }));
    assert_eq!(h.ledger.get("node_a").await.unwrap().reliability, 98);
}

#[tokio::test]
async fn test_accept_with_acting_node_enforces_locally() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;
    route(&h.ledger, "node_c").await;

    let IngestResult::Propagated { event, .. } =
        h.coordinator.ingest(report("user-1", "node_a")).await
    else {
        panic!("expected propagation");
    };

    let resolved = h
        .coordinator
        .resolve(event.id, Resolution::Accept, "mod-c", Some("node_c"))
        .await
        .unwrap();
    assert_eq!(resolved.status, EventStatus::Accepted);

    let actions = h.enforcer.actions.lock().await;
    assert_eq!(
        actions.as_slice(),
        &[(
            "node_c".to_string(),
            "user-1".to_string(),
            EnforceAction::Ban
        )]
    );
}

#[tokio::test]
async fn test_untrusted_origin_never_triggers_auto_ban() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;
    route(&h.ledger, "node_b").await;
    h.ledger
        .update_routing(
            "node_b",
            RoutingUpdate {
                auto_ban: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Reliability 49 is below the auto-act floor
    for _ in 0..51 {
        h.ledger.adjust_reliability("node_a", -1).await.unwrap();
    }

    let IngestResult::Propagated {
        auto_acted, alerted, ..
    } = h.coordinator.ingest(report("user-1", "node_a")).await
    else {
        panic!("expected propagation");
    };
    assert!(auto_acted.is_empty());
    assert_eq!(alerted, vec!["node_b"]);
    assert!(h.enforcer.actions.lock().await.is_empty());
}

#[tokio::test]
async fn test_delivery_failure_does_not_abort_fanout() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;
    route(&h.ledger, "node_b").await;
    route(&h.ledger, "node_c").await;
    route(&h.ledger, "node_d").await;
    h.notifier.fail.store(true, Ordering::SeqCst);

    let result = h.coordinator.ingest(report("user-1", "node_a")).await;
    let IngestResult::Propagated { mut alerted, .. } = result else {
        panic!("expected propagation");
    };
    alerted.sort();
    assert_eq!(alerted, vec!["node_b", "node_c", "node_d"]);

    // Every peer was still attempted despite the failures
    assert_eq!(h.notifier.sent.lock().await.len(), 3);
}

#[tokio::test]
async fn test_blocked_peer_excluded_from_fanout() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;
    route(&h.ledger, "node_b").await;
    route(&h.ledger, "node_c").await;
    h.ledger.block_peer("node_c", "node_a").await.unwrap();

    let IngestResult::Propagated { alerted, .. } =
        h.coordinator.ingest(report("user-1", "node_a")).await
    else {
        panic!("expected propagation");
    };
    assert_eq!(alerted, vec!["node_b"]);
}

#[tokio::test]
async fn test_struck_node_reports_are_ignored() {
    let h = build_harness();
    route(&h.ledger, "node_b").await;
    h.coordinator.strike_node("node_a").await;

    assert!(matches!(
        h.coordinator.ingest(report("user-1", "node_a")).await,
        IngestResult::OriginBlacklisted
    ));
    assert!(h.notifier.sent.lock().await.is_empty());

    // Struck nodes also stop receiving alerts
    h.coordinator.strike_node("node_b").await;
    h.ledger.get_or_create("node_d").await;
    let IngestResult::Propagated { alerted, .. } =
        h.coordinator.ingest(report("user-2", "node_d")).await
    else {
        panic!("expected propagation");
    };
    assert!(alerted.is_empty());
}

#[tokio::test]
async fn test_rate_limit_boundary() {
    let limiter = RateLimiter::new(RateLimiterConfig {
        max_events: 5,
        time_window_secs: 180,
    });
    let start = Utc::now();

    for i in 0..5 {
        assert!(limiter.try_admit("origin", start + Duration::seconds(i)));
    }
    // Sixth inside the window is denied
    assert!(!limiter.try_admit("origin", start + Duration::seconds(10)));
    // Once the first admission falls out of the window, capacity returns
    assert!(limiter.try_admit("origin", start + Duration::seconds(181)));
}

#[tokio::test]
async fn test_dedup_window_boundary() {
    let store = EventStore::new();
    let start = Utc::now();
    let window = Duration::seconds(300);

    store
        .create("user-1", "node_a", "mod", None, EventStatus::Pending, start)
        .await;

    assert!(store.recent_exists("user-1", window, start + Duration::seconds(299)).await);
    assert!(!store.recent_exists("user-1", window, start + Duration::seconds(300)).await);
}

#[tokio::test]
async fn test_reliability_clamping() {
    let ledger = TrustLedger::new();
    ledger.get_or_create("n1").await;

    assert_eq!(ledger.adjust_reliability("n1", 1).await.unwrap(), 100);
    for _ in 0..200 {
        ledger.adjust_reliability("n1", -1).await.unwrap();
    }
    assert_eq!(ledger.get("n1").await.unwrap().reliability, 0);
    assert_eq!(ledger.adjust_reliability("n1", -1).await.unwrap(), 0);
}

#[tokio::test]
async fn test_review_flow_end_to_end() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;

    let event = h
        .coordinator
        .flag_for_review("user-1", "node_a", "mod-1", Some("looks retaliatory".into()))
        .await;
    assert_eq!(event.status, EventStatus::UnderReview);

    // Flagged events do not fan out or move reliability
    assert!(h.notifier.sent.lock().await.is_empty());
    assert_eq!(h.ledger.get("node_a").await.unwrap().reliability, 100);

    let approved = h
        .coordinator
        .resolve_review(event.id, true, "owner")
        .await
        .unwrap();
    assert_eq!(approved.status, EventStatus::Accepted);
    assert!(h.coordinator.pending_reviews().await.is_empty());
}

#[tokio::test]
async fn test_risk_score_is_deterministic() {
    let identity = risky_identity("u1");
    let now = Utc::now();
    let toggles = RuleToggles::default();

    let first = scorer::evaluate(&identity, &JoinContext::default(), &toggles, now);
    let second = scorer::evaluate(&identity, &JoinContext::default(), &toggles, now);
    assert_eq!(first.total, 110);
    assert_eq!(second.total, 110);
}

#[tokio::test]
async fn test_quick_join_window_boundaries() {
    let tracker = JoinWindowTracker::new();
    let now = Utc::now();

    tracker.record_join("n1", "first", now);
    assert!(tracker.has_recent_other_join("n1", "second", now + Duration::seconds(90)));
    assert!(!tracker.has_recent_other_join("n1", "second", now + Duration::seconds(150)));
}

#[tokio::test]
async fn test_auto_kick_and_dismissal_suppression() {
    let h = build_harness();
    route(&h.ledger, "n1").await;
    h.ledger
        .update_risk(
            "n1",
            RiskUpdate {
                auto_kick: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = h.monitor.on_identity_join("n1", risky_identity("u1")).await;
    assert!(matches!(
        outcome,
        JoinOutcome::AutoActed {
            action: RiskActionKind::AutoKicked,
            ..
        }
    ));
    assert_eq!(
        h.enforcer.actions.lock().await[0],
        ("n1".to_string(), "u1".to_string(), EnforceAction::Kick)
    );

    // Switch to manual mode, alert, dismiss, then verify suppression
    h.ledger
        .update_risk(
            "n1",
            RiskUpdate {
                auto_kick: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let JoinOutcome::Alerted { alert_id, .. } =
        h.monitor.on_identity_join("n1", risky_identity("u2")).await
    else {
        panic!("expected alert");
    };
    h.monitor
        .resolve_alert(&alert_id, AlertAction::Dismiss, "mod-1")
        .await
        .unwrap();

    assert!(matches!(
        h.monitor.on_identity_join("n1", risky_identity("u2")).await,
        JoinOutcome::Suppressed
    ));

    // Dismissed entries stay dismissed until explicitly cleared
    assert!(h.monitor.clear_dismissal("n1", "u2").await);
    assert!(matches!(
        h.monitor.on_identity_join("n1", risky_identity("u2")).await,
        JoinOutcome::Alerted { .. }
    ));
}

#[tokio::test]
async fn test_alert_resolution_once_only() {
    let h = build_harness();
    route(&h.ledger, "n1").await;

    let JoinOutcome::Alerted { alert_id, .. } =
        h.monitor.on_identity_join("n1", risky_identity("u1")).await
    else {
        panic!("expected alert");
    };

    h.monitor
        .resolve_alert(&alert_id, AlertAction::Ban, "mod-1")
        .await
        .unwrap();
    let err = h
        .monitor
        .resolve_alert(&alert_id, AlertAction::Kick, "mod-2")
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::AlertAlreadyResolved(_)));

    // Exactly one enforcement and one logged action
    assert_eq!(h.enforcer.actions.lock().await.len(), 1);
    assert_eq!(h.monitor.actions_for("n1").await.len(), 1);
}

#[tokio::test]
async fn test_node_removal_cascades_events() {
    let h = build_harness();
    h.ledger.get_or_create("node_a").await;
    h.coordinator.ingest(report("user-1", "node_a")).await;
    h.coordinator.ingest(report("user-2", "node_a")).await;

    let removed = h.coordinator.remove_node("node_a").await.unwrap();
    assert_eq!(removed, 2);
    assert!(h.ledger.get("node_a").await.is_none());
    assert!(h.coordinator.list_events("user-1").await.is_empty());

    // Reports from the removed node are no longer accepted
    assert!(matches!(
        h.coordinator.ingest(report("user-3", "node_a")).await,
        IngestResult::UnknownOrigin
    ));
}
