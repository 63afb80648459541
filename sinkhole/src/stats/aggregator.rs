use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::Serialize;
use time::OffsetDateTime;

use super::{StatsSink, ring::RingBuffer};

/// Number of recent queries kept for the dashboard.
pub const RECENT_QUERIES_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryLabel {
    Blocked,
    Allowed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentQuery {
    pub domain: String,
    pub blocked: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "type")]
    pub label: QueryLabel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedDomainCounter {
    pub domain: String,
    pub count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    pub total_queries: u64,
    pub blocked_queries: u64,
    pub allowed_queries: u64,
}

/// Independent copy of everything the aggregator tracks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub counters: AggregateCounters,
    pub blocked_domains: BTreeMap<String, BlockedDomainCounter>,
    /// Most recent first.
    pub recent_queries: Vec<RecentQuery>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
}

#[derive(Debug)]
struct Inner {
    counters: AggregateCounters,
    /// Position of each domain in `blocked`, which stays in first-seen order.
    index: HashMap<String, usize>,
    blocked: Vec<BlockedDomainCounter>,
    recent: RingBuffer<RecentQuery>,
}

/// Process-wide query statistics.
///
/// Every mutation happens inside a single write-lock section, so readers
/// always observe `total = blocked + allowed`.
#[derive(Debug)]
pub struct StatsAggregator {
    inner: RwLock<Inner>,
    start_time: OffsetDateTime,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_QUERIES_CAPACITY)
    }

    pub fn with_capacity(recent_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                counters: AggregateCounters::default(),
                index: HashMap::new(),
                blocked: Vec::new(),
                recent: RingBuffer::new(recent_capacity),
            }),
            start_time: OffsetDateTime::now_utc(),
        }
    }

    pub fn record_query(&self, domain: &str, blocked: bool) {
        let now = OffsetDateTime::now_utc();
        let mut inner = self.inner.write();

        inner.counters.total_queries += 1;
        if blocked {
            inner.counters.blocked_queries += 1;

            match inner.index.get(domain).copied() {
                Some(i) => {
                    let entry = &mut inner.blocked[i];
                    entry.count += 1;
                    entry.last_seen = now;
                }
                None => {
                    let i = inner.blocked.len();
                    inner.blocked.push(BlockedDomainCounter {
                        domain: domain.to_string(),
                        count: 1,
                        last_seen: now,
                    });
                    inner.index.insert(domain.to_string(), i);
                }
            }
        } else {
            inner.counters.allowed_queries += 1;
        }

        inner.recent.push(RecentQuery {
            domain: domain.to_string(),
            blocked,
            timestamp: now,
            label: if blocked { QueryLabel::Blocked } else { QueryLabel::Allowed },
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read();

        StatsSnapshot {
            counters: inner.counters,
            blocked_domains: inner
                .blocked
                .iter()
                .map(|entry| (entry.domain.clone(), entry.clone()))
                .collect(),
            recent_queries: inner.recent.iter_newest_first().cloned().collect(),
            start_time: self.start_time,
        }
    }

    /// Blocked domains by descending count, ties in first-seen order.
    ///
    /// A `limit` of zero, or one not smaller than the number of entries,
    /// returns everything.
    pub fn top_blocked(&self, limit: usize) -> Vec<BlockedDomainCounter> {
        let mut ranked = self.inner.read().blocked.clone();
        // Stable, so equal counts keep insertion order.
        ranked.sort_by(|a, b| b.count.cmp(&a.count));

        if limit > 0 && limit < ranked.len() {
            ranked.truncate(limit);
        }
        ranked
    }
}

impl StatsSink for StatsAggregator {
    fn record_query(&self, domain: &str, blocked: bool) {
        StatsAggregator::record_query(self, domain, blocked)
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod aggregator_tests;
