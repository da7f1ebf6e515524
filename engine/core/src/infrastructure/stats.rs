// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message statistics.
//!
//! One [`MessageStats`] is shared by every queue of a solve. Each recorded
//! message updates the per-type and per-pair counters and is mirrored into
//! the `metrics` facade, so an installed recorder (Prometheus in the CLI)
//! sees the same numbers:
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `dcop_messages_total` | counter | `type` |
//! | `dcop_message_bytes_total` | counter | `type` |
//! | `dcop_message_size_bytes` | histogram | `type` |

use crate::domain::addable::Addable;
use crate::domain::message::Payload;
use crate::domain::variable::AgentId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one message type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: u64,
    pub bytes: u64,
    pub max_size: u64,
}

/// Counters for one sender → recipient pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairStats {
    pub count: u64,
    pub bytes: u64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub by_type: BTreeMap<String, TypeStats>,
    /// sender → recipient → counters
    pub by_pair: BTreeMap<AgentId, BTreeMap<AgentId, PairStats>>,
}

impl StatsSnapshot {
    pub fn total_messages(&self) -> u64 {
        self.by_type.values().map(|t| t.count).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.by_type.values().map(|t| t.bytes).sum()
    }

    pub fn count_of(&self, message_type: &str) -> u64 {
        self.by_type.get(message_type).map_or(0, |t| t.count)
    }
}

#[derive(Debug, Default)]
pub struct MessageStats {
    inner: Mutex<StatsSnapshot>,
}

impl MessageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message. Messages to reserved recipients are ignored.
    pub fn record<U: Addable>(&self, from: &AgentId, to: &AgentId, payload: &Payload<U>) {
        if to.is_reserved() {
            return;
        }
        let kind = payload.kind().name();
        let size = bincode::serialized_size(payload).unwrap_or(0);

        {
            let mut inner = self.inner.lock();
            let entry = inner.by_type.entry(kind.to_string()).or_default();
            entry.count += 1;
            entry.bytes += size;
            entry.max_size = entry.max_size.max(size);
            let pair = inner
                .by_pair
                .entry(from.clone())
                .or_default()
                .entry(to.clone())
                .or_default();
            pair.count += 1;
            pair.bytes += size;
        }

        metrics::counter!("dcop_messages_total", "type" => kind).increment(1);
        metrics::counter!("dcop_message_bytes_total", "type" => kind).increment(size);
        metrics::histogram!("dcop_message_size_bytes", "type" => kind).record(size as f64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::utility::UtilitySpace;

    #[test]
    fn test_counts_per_type_and_pair() {
        let stats = MessageStats::new();
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        let small: Payload<i64> = Payload::OptTableStored { variable: "x".into() };
        let space = UtilitySpace::constant("u", vec!["x".into()], vec![vec![0, 1, 2, 3]], 0i64, i64::MAX).unwrap();
        let large: Payload<i64> = Payload::Util {
            from: "x".into(),
            to: "y".into(),
            space,
        };

        stats.record(&a, &b, &small);
        stats.record(&a, &b, &large);
        stats.record(&b, &a, &large);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_messages(), 3);
        assert_eq!(snapshot.count_of("UTIL"), 2);
        assert_eq!(snapshot.by_pair[&a][&b].count, 2);
        assert_eq!(snapshot.by_pair[&b][&a].count, 1);

        let util = snapshot.by_type["UTIL"];
        let stored = snapshot.by_type["OPT_TABLE_STORED"];
        assert_eq!(util.bytes, 2 * util.max_size);
        assert!(util.max_size > stored.max_size);
        assert_eq!(snapshot.by_pair[&a][&b].bytes, stored.bytes + util.max_size);
        assert_eq!(snapshot.by_pair[&b][&a].bytes, util.max_size);

        let pair_bytes: u64 = snapshot.by_pair.values().flat_map(|m| m.values()).map(|p| p.bytes).sum();
        assert_eq!(pair_bytes, snapshot.total_bytes());
    }

    #[test]
    fn test_reserved_recipients_are_not_counted() {
        let stats = MessageStats::new();
        let payload: Payload<i64> = Payload::Assignment {
            variable: "x".into(),
            value: 1,
        };
        stats.record(&AgentId::from("a"), &AgentId::stats_monitor(), &payload);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
