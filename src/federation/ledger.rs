//! Trust ledger: durable per-node state.
//!
//! Tracks each federation node's reliability score, blacklist flag, blocked
//! peers, and routing/risk configuration. Reliability is the 0-100 trust
//! signal peers use to gate automatic enforcement: accepted reports earn +1,
//! dismissed reports cost -1, always through the same clamped primitive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::database::pool::DatabasePool;
use crate::error::{FederationError, Result};

pub const RELIABILITY_MAX: u8 = 100;
pub const RELIABILITY_DEFAULT: u8 = 100;
/// Minimum origin reliability for a peer's auto-ban to fire.
pub const AUTO_ACT_RELIABILITY_FLOOR: u8 = 50;

pub const RISK_THRESHOLD_DEFAULT: u32 = 100;
pub const RISK_THRESHOLD_MIN: u32 = 50;
pub const RISK_THRESHOLD_MAX: u32 = 200;

/// Where and how a node receives propagated alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Alert destination; a node without one is never a fan-out target
    pub alert_channel: Option<String>,
    /// Optional ping target included in decision requests
    pub ping_target: Option<String>,
    /// Accept sufficiently-trusted peer bans without human review
    pub auto_ban: bool,
}

/// Per-rule enable flags for the risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleToggles {
    pub new_account: bool,
    pub no_avatar: bool,
    pub alt_name: bool,
    pub default_name: bool,
    pub previous_ban: bool,
    pub quick_join: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            new_account: true,
            no_avatar: true,
            alt_name: true,
            default_name: true,
            previous_ban: true,
            quick_join: true,
        }
    }
}

/// Per-node risk-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub enabled: bool,
    /// Alert threshold, clamped to 50-200
    pub threshold: u32,
    pub rules: RuleToggles,
    pub auto_kick: bool,
    pub auto_ban: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: RISK_THRESHOLD_DEFAULT,
            rules: RuleToggles::default(),
            auto_kick: false,
            auto_ban: false,
        }
    }
}

impl RiskConfig {
    /// Auto-kick and auto-ban are mutually exclusive; enabling one clears
    /// the other. These two setters are the only mutators.
    pub fn set_auto_kick(&mut self, enabled: bool) {
        self.auto_kick = enabled;
        if enabled {
            self.auto_ban = false;
        }
    }

    pub fn set_auto_ban(&mut self, enabled: bool) {
        self.auto_ban = enabled;
        if enabled {
            self.auto_kick = false;
        }
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold.clamp(RISK_THRESHOLD_MIN, RISK_THRESHOLD_MAX);
    }
}

/// One moderation domain in the federation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub reliability: u8,
    /// Struck nodes: outgoing events ignored, excluded as fan-out targets
    pub blacklisted: bool,
    /// Peers whose events this node refuses to receive
    pub blocked_peers: HashSet<String>,
    pub routing: RoutingConfig,
    pub risk: RiskConfig,
    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn new(id: String) -> Self {
        Self {
            id,
            reliability: RELIABILITY_DEFAULT,
            blacklisted: false,
            blocked_peers: HashSet::new(),
            routing: RoutingConfig::default(),
            risk: RiskConfig::default(),
            created_at: Utc::now(),
        }
    }
}

/// Partial routing update; `Some` fields replace the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingUpdate {
    pub alert_channel: Option<String>,
    pub ping_target: Option<String>,
    pub auto_ban: Option<bool>,
}

/// Partial risk-config update; threshold is clamped, auto toggles keep
/// their mutual exclusion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskUpdate {
    pub enabled: Option<bool>,
    pub threshold: Option<u32>,
    pub rules: Option<RuleToggles>,
    pub auto_kick: Option<bool>,
    pub auto_ban: Option<bool>,
}

/// In-memory node registry with write-through Postgres mirroring.
pub struct TrustLedger {
    nodes: RwLock<HashMap<String, NodeRecord>>,
    db: Option<Arc<DatabasePool>>,
    default_threshold: u32,
}

impl TrustLedger {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            db: None,
            default_threshold: RISK_THRESHOLD_DEFAULT,
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Risk threshold applied to nodes created from this ledger.
    pub fn with_default_threshold(mut self, threshold: u32) -> Self {
        self.default_threshold = threshold.clamp(RISK_THRESHOLD_MIN, RISK_THRESHOLD_MAX);
        self
    }

    fn new_record(&self, node_id: &str) -> NodeRecord {
        let mut record = NodeRecord::new(node_id.to_string());
        record.risk.threshold = self.default_threshold;
        record
    }

    /// Reload node records from the database mirror.
    pub async fn hydrate(&self) -> Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };

        let records = db
            .nodes()
            .load_all()
            .await
            .map_err(FederationError::Storage)?;

        let mut nodes = self.nodes.write().await;
        *nodes = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Ok(())
    }

    async fn mirror(&self, record: &NodeRecord) {
        if let Some(db) = &self.db {
            if let Err(e) = db.nodes().upsert(record).await {
                warn!(node_id = %record.id, error = %e, "Failed to mirror node record");
            }
        }
    }

    pub async fn get(&self, node_id: &str) -> Option<NodeRecord> {
        let nodes = self.nodes.read().await;
        nodes.get(node_id).cloned()
    }

    /// First contact creates the node with defaults (reliability 100, not
    /// blacklisted).
    pub async fn get_or_create(&self, node_id: &str) -> NodeRecord {
        {
            let nodes = self.nodes.read().await;
            if let Some(record) = nodes.get(node_id) {
                return record.clone();
            }
        }

        let record = {
            let mut nodes = self.nodes.write().await;
            nodes
                .entry(node_id.to_string())
                .or_insert_with(|| self.new_record(node_id))
                .clone()
        };
        self.mirror(&record).await;
        record
    }

    /// The one clamped primitive every reliability mutation goes through.
    pub async fn adjust_reliability(&self, node_id: &str, delta: i8) -> Result<u8> {
        let record = {
            let mut nodes = self.nodes.write().await;
            let record = nodes
                .get_mut(node_id)
                .ok_or_else(|| FederationError::UnknownNode(node_id.to_string()))?;
            record.reliability = record
                .reliability
                .saturating_add_signed(delta)
                .min(RELIABILITY_MAX);
            record.clone()
        };
        self.mirror(&record).await;
        Ok(record.reliability)
    }

    /// Force-blacklist a node, creating it if it was never seen.
    pub async fn strike(&self, node_id: &str) -> NodeRecord {
        let record = {
            let mut nodes = self.nodes.write().await;
            let record = nodes
                .entry(node_id.to_string())
                .or_insert_with(|| self.new_record(node_id));
            record.blacklisted = true;
            record.clone()
        };
        info!(node_id = %node_id, "Node struck and blacklisted");
        self.mirror(&record).await;
        record
    }

    pub async fn block_peer(&self, node_id: &str, peer_id: &str) -> Result<()> {
        let record = {
            let mut nodes = self.nodes.write().await;
            let record = nodes
                .get_mut(node_id)
                .ok_or_else(|| FederationError::UnknownNode(node_id.to_string()))?;
            record.blocked_peers.insert(peer_id.to_string());
            record.clone()
        };
        self.mirror(&record).await;
        Ok(())
    }

    pub async fn unblock_peer(&self, node_id: &str, peer_id: &str) -> Result<()> {
        let record = {
            let mut nodes = self.nodes.write().await;
            let record = nodes
                .get_mut(node_id)
                .ok_or_else(|| FederationError::UnknownNode(node_id.to_string()))?;
            record.blocked_peers.remove(peer_id);
            record.clone()
        };
        self.mirror(&record).await;
        Ok(())
    }

    pub async fn update_routing(&self, node_id: &str, update: RoutingUpdate) -> Result<NodeRecord> {
        let record = {
            let mut nodes = self.nodes.write().await;
            let record = nodes
                .entry(node_id.to_string())
                .or_insert_with(|| self.new_record(node_id));
            if let Some(channel) = update.alert_channel {
                record.routing.alert_channel = Some(channel);
            }
            if let Some(target) = update.ping_target {
                record.routing.ping_target = Some(target);
            }
            if let Some(auto_ban) = update.auto_ban {
                record.routing.auto_ban = auto_ban;
            }
            record.clone()
        };
        self.mirror(&record).await;
        Ok(record)
    }

    pub async fn update_risk(&self, node_id: &str, update: RiskUpdate) -> Result<NodeRecord> {
        let record = {
            let mut nodes = self.nodes.write().await;
            let record = nodes
                .entry(node_id.to_string())
                .or_insert_with(|| self.new_record(node_id));
            if let Some(enabled) = update.enabled {
                record.risk.enabled = enabled;
            }
            if let Some(threshold) = update.threshold {
                record.risk.set_threshold(threshold);
            }
            if let Some(rules) = update.rules {
                record.risk.rules = rules;
            }
            if let Some(auto_kick) = update.auto_kick {
                record.risk.set_auto_kick(auto_kick);
            }
            if let Some(auto_ban) = update.auto_ban {
                record.risk.set_auto_ban(auto_ban);
            }
            record.clone()
        };
        self.mirror(&record).await;
        Ok(record)
    }

    /// Remove a node when the moderation relationship ends. The coordinator
    /// cascades deletion of the events it originated.
    pub async fn remove(&self, node_id: &str) -> Option<NodeRecord> {
        let removed = {
            let mut nodes = self.nodes.write().await;
            nodes.remove(node_id)
        };

        if removed.is_some() {
            if let Some(db) = &self.db {
                if let Err(e) = db.nodes().delete(node_id).await {
                    warn!(node_id = %node_id, error = %e, "Failed to mirror node deletion");
                }
            }
        }
        removed
    }

    /// Eligible fan-out targets for an origin's event: every known node that
    /// is not the origin, not blacklisted, has an alert destination, and has
    /// not blocked the origin.
    pub async fn fanout_targets(&self, origin_node_id: &str) -> Vec<NodeRecord> {
        let nodes = self.nodes.read().await;
        nodes
            .values()
            .filter(|n| {
                n.id != origin_node_id
                    && !n.blacklisted
                    && n.routing.alert_channel.is_some()
                    && !n.blocked_peers.contains(origin_node_id)
            })
            .cloned()
            .collect()
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new()
    }
}
