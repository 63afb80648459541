use std::sync::Arc;

use super::*;

#[test]
fn test_counters_stay_consistent() {
    let stats = StatsAggregator::new();

    stats.record_query("ads.example.com", true);
    stats.record_query("example.com", false);
    stats.record_query("ads.example.com", true);

    let snap = stats.snapshot();
    assert_eq!(snap.counters.total_queries, 3);
    assert_eq!(snap.counters.blocked_queries, 2);
    assert_eq!(snap.counters.allowed_queries, 1);
    assert_eq!(
        snap.counters.total_queries,
        snap.counters.blocked_queries + snap.counters.allowed_queries
    );

    let entry = &snap.blocked_domains["ads.example.com"];
    assert_eq!(entry.count, 2);
    assert!(!snap.blocked_domains.contains_key("example.com"));
}

#[test]
fn test_recent_queries_bounded_newest_first() {
    let stats = StatsAggregator::new();

    for i in 0..120 {
        stats.record_query(&format!("host{i}.example.com"), i % 3 == 0);
    }

    let snap = stats.snapshot();
    assert_eq!(snap.recent_queries.len(), RECENT_QUERIES_CAPACITY);

    let expected: Vec<String> = (70..120).rev().map(|i| format!("host{i}.example.com")).collect();
    let got: Vec<String> = snap.recent_queries.iter().map(|q| q.domain.clone()).collect();
    assert_eq!(got, expected);

    for query in &snap.recent_queries {
        let label = if query.blocked { QueryLabel::Blocked } else { QueryLabel::Allowed };
        assert_eq!(query.label, label);
    }
}

#[test]
fn test_top_blocked_ordering_and_limit() {
    let stats = StatsAggregator::new();

    for (domain, times) in [("a.test", 1), ("b.test", 3), ("c.test", 1), ("d.test", 3), ("e.test", 2)] {
        for _ in 0..times {
            stats.record_query(domain, true);
        }
    }

    let domains = |list: Vec<BlockedDomainCounter>| -> Vec<String> {
        list.into_iter().map(|entry| entry.domain).collect()
    };

    assert_eq!(
        domains(stats.top_blocked(0)),
        vec!["b.test", "d.test", "e.test", "a.test", "c.test"]
    );
    assert_eq!(domains(stats.top_blocked(2)), vec!["b.test", "d.test"]);
    assert_eq!(domains(stats.top_blocked(99)).len(), 5);

    // Ranking is a pure read.
    assert_eq!(stats.top_blocked(3), stats.top_blocked(3));
    assert_eq!(stats.snapshot().counters.blocked_queries, 10);
}

#[test]
fn test_snapshot_is_independent() {
    let stats = StatsAggregator::new();
    stats.record_query("ads.test", true);

    let before = stats.snapshot();
    stats.record_query("ads.test", true);
    stats.record_query("other.test", false);

    assert_eq!(before.counters.total_queries, 1);
    assert_eq!(before.blocked_domains["ads.test"].count, 1);
    assert_eq!(before.recent_queries.len(), 1);
    assert_eq!(before.start_time, stats.snapshot().start_time);
}

#[test]
fn test_snapshot_json_shape() {
    let stats = StatsAggregator::new();
    stats.record_query("ads.test", true);

    let json = serde_json::to_value(stats.snapshot()).unwrap();

    assert_eq!(json["totalQueries"], 1);
    assert_eq!(json["blockedQueries"], 1);
    assert_eq!(json["allowedQueries"], 0);
    assert_eq!(json["blockedDomains"]["ads.test"]["count"], 1);
    assert!(json["blockedDomains"]["ads.test"]["lastSeen"].is_string());
    assert_eq!(json["recentQueries"][0]["type"], "BLOCKED");
    assert!(json["startTime"].is_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_updates_are_not_lost() {
    let stats = Arc::new(StatsAggregator::new());

    let tasks: Vec<_> = (0..1000)
        .map(|i| {
            let stats = stats.clone();
            tokio::spawn(async move {
                stats.record_query(&format!("d{}.test", i % 10), i % 2 == 0);
                // Readers interleave with writers.
                let _ = stats.snapshot();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let snap = stats.snapshot();
    assert_eq!(snap.counters.total_queries, 1000);
    assert_eq!(snap.counters.blocked_queries, 500);
    assert_eq!(snap.counters.allowed_queries, 500);
    assert_eq!(snap.recent_queries.len(), RECENT_QUERIES_CAPACITY);

    let blocked_total: u64 = snap.blocked_domains.values().map(|entry| entry.count).sum();
    assert_eq!(blocked_total, 500);
}
