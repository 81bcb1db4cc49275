//! Sliding window of recent joins per node, backing the quick-join rule.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Window inside which a second join counts as a quick join
pub const QUICK_JOIN_HORIZON_SECS: i64 = 120;
/// How long join entries are retained before the sweeper drops them
pub const JOIN_RETENTION_SECS: i64 = 600;

/// Recent joins per node. Lock-free across nodes, retained long enough to
/// answer quick-join queries with slack for sweep latency.
pub struct JoinWindowTracker {
    joins: DashMap<String, Vec<(String, DateTime<Utc>)>>,
}

impl JoinWindowTracker {
    pub fn new() -> Self {
        Self {
            joins: DashMap::new(),
        }
    }

    pub fn record_join(&self, node_id: &str, identity_id: &str, now: DateTime<Utc>) {
        self.joins
            .entry(node_id.to_string())
            .or_default()
            .push((identity_id.to_string(), now));
    }

    /// True iff a different identity joined this node inside the quick-join
    /// horizon. Callers check before recording the current join, so an
    /// identity never quick-joins against itself.
    pub fn has_recent_other_join(&self, node_id: &str, identity_id: &str, now: DateTime<Utc>) -> bool {
        let horizon = Duration::seconds(QUICK_JOIN_HORIZON_SECS);
        self.joins.get(node_id).is_some_and(|entries| {
            entries
                .iter()
                .any(|(id, at)| id != identity_id && now.signed_duration_since(*at) < horizon)
        })
    }

    /// Drop entries past retention; empty node windows are removed outright.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let retention = Duration::seconds(JOIN_RETENTION_SECS);
        self.joins.retain(|_, entries| {
            entries.retain(|(_, at)| now.signed_duration_since(*at) < retention);
            !entries.is_empty()
        });
    }
}

impl Default for JoinWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}
